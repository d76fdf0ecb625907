#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::time::Duration;

pub const BIND_ADDR: &str = "0.0.0.0:8080";

/// Startup settings. Immutable once the server is running.
#[derive(Clone, Debug, Default, PartialEq, Eq, Parser)]
#[command(
    name = "memhog-agent",
    about = "Allocate and hold memory for a specified duration",
    version
)]
pub struct Settings {
    /// Amount of memory to allocate at startup in megabytes (0 to skip).
    #[arg(short = 'a', long = "allocateMB", env = "ALLOCATE_MB", default_value_t = 0)]
    pub allocate_mb: u32,

    /// Time to hold allocated memory before freeing (e.g. "500ms", "1m30s").
    #[arg(
        long = "holdAllocTime",
        visible_alias = "ha",
        env = "HOLD_ALLOC_TIME",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    pub hold_alloc_time: Duration,

    /// Time to wait after freeing memory before allocating again.
    #[arg(
        long = "holdFreeTime",
        visible_alias = "hf",
        env = "HOLD_FREE_TIME",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    pub hold_free_time: Duration,
}

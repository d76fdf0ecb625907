#![deny(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod domain;
pub mod http;
pub mod lib_mem;
pub mod metrics;
pub mod release;
pub mod service;
pub mod validation;

pub use config::Settings;
pub use domain::{
    AppState, CancelOutcome, DemoLoops, LoopState, DEMO_LOOP_ITERATIONS, FINISHED_LOOPS_RETAINED,
};
pub use http::{allocate, configure, demo_loop, free, healthz, scrape_metrics, serve};
pub use lib_mem::MemoryController;
pub use metrics::Metrics;
pub use service::DemoLoopRunner;
pub use validation::allocation_bytes;

#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use clap::Parser;
use memhog_agent::{serve, Settings};
use tracing::{error, info};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let settings = Settings::parse();
    info!(
        allocate_mb = settings.allocate_mb,
        hold_alloc_time = %humantime::format_duration(settings.hold_alloc_time),
        hold_free_time = %humantime::format_duration(settings.hold_free_time),
        "starting memory allocator"
    );
    if let Err(e) = serve(settings).await {
        error!(error = %format!("{e:#}"), "server failed");
        return Err(e.into());
    }
    Ok(())
}

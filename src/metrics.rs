#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub allocated_bytes: IntGauge,
    pub allocations_total: IntCounter,
    pub allocation_failures_total: IntCounter,
    pub frees_total: IntCounter,
    pub demo_loops_started_total: IntCounter,
    pub demo_loops_active: IntGauge,
}

impl Metrics {
    pub fn new() -> AnyResult<Self> {
        let registry = Registry::new();
        let allocated_bytes = IntGauge::with_opts(Opts::new(
            "memhog_allocated_bytes",
            "bytes currently held by the allocation slot",
        ))
        .context("create allocated_bytes")?;
        let allocations_total = IntCounter::with_opts(Opts::new(
            "memhog_allocations_total",
            "completed allocations",
        ))
        .context("create allocations_total")?;
        let allocation_failures_total = IntCounter::with_opts(Opts::new(
            "memhog_allocation_failures_total",
            "allocations the allocator refused",
        ))
        .context("create allocation_failures_total")?;
        let frees_total = IntCounter::with_opts(Opts::new("memhog_frees_total", "free calls"))
            .context("create frees_total")?;
        registry
            .register(Box::new(allocated_bytes.clone()))
            .context("register allocated_bytes")?;
        registry
            .register(Box::new(allocations_total.clone()))
            .context("register allocations_total")?;
        registry
            .register(Box::new(allocation_failures_total.clone()))
            .context("register allocation_failures_total")?;
        registry
            .register(Box::new(frees_total.clone()))
            .context("register frees_total")?;
        let demo_loops_started_total = IntCounter::with_opts(Opts::new(
            "memhog_demo_loops_started_total",
            "demo loops launched",
        ))
        .context("create demo_loops_started_total")?;
        let demo_loops_active = IntGauge::with_opts(Opts::new(
            "memhog_demo_loops_active",
            "demo loops currently running",
        ))
        .context("create demo_loops_active")?;
        registry
            .register(Box::new(demo_loops_started_total.clone()))
            .context("register demo_loops_started_total")?;
        registry
            .register(Box::new(demo_loops_active.clone()))
            .context("register demo_loops_active")?;
        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .context("register process collector")?;
        Ok(Self {
            registry,
            allocated_bytes,
            allocations_total,
            allocation_failures_total,
            frees_total,
            demo_loops_started_total,
            demo_loops_active,
        })
    }

    pub fn set_allocated(&self, bytes: usize) {
        self.allocated_bytes
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
    }

    pub fn encode_text(&self) -> AnyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf).context("encode metrics")?;
        Ok(buf)
    }
}

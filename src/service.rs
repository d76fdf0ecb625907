#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::domain::{AppState, CancelOutcome, DemoLoops, LoopState, DEMO_LOOP_ITERATIONS};
use crate::lib_mem::MemoryController;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct DemoLoopRunner {
    memory: MemoryController,
    loops: DemoLoops,
    settings: Settings,
    metrics: Metrics,
}

impl DemoLoopRunner {
    pub fn new(
        memory: MemoryController,
        loops: DemoLoops,
        settings: Settings,
        metrics: Metrics,
    ) -> Self {
        Self {
            memory,
            loops,
            settings,
            metrics,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.memory.clone(),
            state.loops.clone(),
            state.settings.clone(),
            state.metrics.clone(),
        )
    }

    /// Starts a demo loop in the background and returns its id together
    /// with the task handle. The loop outlives the caller.
    pub fn launch(&self, megabytes: u32) -> (u64, JoinHandle<()>) {
        let now = chrono::Utc::now().timestamp();
        let (id, token) = self.loops.register(megabytes, now);
        self.metrics.demo_loops_started_total.inc();
        self.metrics.demo_loops_active.inc();
        info!(demo_loop = id, megabytes, "starting demo loop");
        let runner = self.clone();
        let handle = tokio::spawn(async move {
            runner.run_to_completion(id, megabytes, token).await;
        });
        (id, handle)
    }

    async fn run_to_completion(self, id: u64, megabytes: u32, token: CancellationToken) {
        if let Err(e) = self.run_iterations(id, megabytes, &token).await {
            error!(demo_loop = id, error = %format!("{e:#}"), "demo loop aborted");
        }
        if token.is_cancelled() {
            warn!(demo_loop = id, "demo loop cancelled");
            if let Err(e) = self.free().await {
                error!(demo_loop = id, error = %format!("{e:#}"), "free after cancel failed");
            }
        }
        self.loops.finish(id);
        self.metrics.demo_loops_active.dec();
        info!(demo_loop = id, "demo loop finished");
    }

    async fn run_iterations(
        &self,
        id: u64,
        megabytes: u32,
        token: &CancellationToken,
    ) -> AnyResult<()> {
        for iteration in 1..=DEMO_LOOP_ITERATIONS {
            if token.is_cancelled() {
                return Ok(());
            }
            self.allocate(megabytes).await?;
            let hold_alloc = self.settings.hold_alloc_time;
            if !hold_alloc.is_zero() {
                info!(
                    demo_loop = id,
                    iteration,
                    hold = %humantime::format_duration(hold_alloc),
                    "holding allocated memory"
                );
            }
            if !hold(hold_alloc, token).await {
                return Ok(());
            }
            self.free().await?;
            self.loops.record_iteration(id);
            let hold_free = self.settings.hold_free_time;
            if !hold_free.is_zero() {
                info!(
                    demo_loop = id,
                    iteration,
                    hold = %humantime::format_duration(hold_free),
                    "waiting before allocating again"
                );
            }
            if !hold(hold_free, token).await {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn allocate(&self, megabytes: u32) -> AnyResult<()> {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || memory.allocate(megabytes))
            .await
            .context("allocation task")?
    }

    async fn free(&self) -> AnyResult<()> {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || memory.free())
            .await
            .context("free task")
    }

    pub fn stop(&self, id: u64) -> CancelOutcome {
        self.loops.cancel(id)
    }

    pub fn status(&self, id: u64) -> Option<LoopState> {
        self.loops.status(id)
    }

    pub fn encode_metrics(&self) -> AnyResult<Vec<u8>> {
        self.metrics.encode_text()
    }

    pub fn health(&self) -> HealthReport {
        let metrics_ok = self.metrics.encode_text().is_ok();
        HealthReport {
            status: if metrics_ok { "ok" } else { "degraded" }.to_string(),
            allocated_bytes: self.memory.allocated_bytes().unwrap_or(0),
            active_loops: self.loops.active(),
            metrics_ok,
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on cancel.
async fn hold(duration: Duration, token: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        () = token.cancelled() => false,
        () = sleep(duration) => true,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub allocated_bytes: usize,
    pub active_loops: usize,
    pub metrics_ok: bool,
}

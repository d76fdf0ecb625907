#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::lib_mem::MemoryController;
use crate::metrics::Metrics;

pub const DEMO_LOOP_ITERATIONS: u32 = 5;

/// Finished loop records kept for status queries; older ones are evicted.
pub const FINISHED_LOOPS_RETAINED: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub id: u64,
    pub megabytes: u32,
    pub running: bool,
    pub cancelled: bool,
    pub iterations_completed: u32,
    pub total_iterations: u32,
    pub started_ts_seconds: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotRunning,
    NotFound,
}

struct LoopEntry {
    state: LoopState,
    // released once the loop finishes
    token: Option<CancellationToken>,
}

/// Book-keeping for launched demo loops. Loops may overlap.
#[derive(Clone)]
pub struct DemoLoops {
    entries: Arc<Mutex<BTreeMap<u64, LoopEntry>>>,
    next_id: Arc<AtomicU64>,
    root: CancellationToken,
}

impl Default for DemoLoops {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl DemoLoops {
    /// Every loop token is a child of `root`; cancelling it stops all loops.
    pub fn new(root: CancellationToken) -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            root,
        }
    }

    pub fn register(&self, megabytes: u32, now_ts: i64) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let state = LoopState {
            id,
            megabytes,
            running: true,
            cancelled: false,
            iterations_completed: 0,
            total_iterations: DEMO_LOOP_ITERATIONS,
            started_ts_seconds: now_ts,
        };
        self.entries.lock().insert(
            id,
            LoopEntry {
                state,
                token: Some(token.clone()),
            },
        );
        (id, token)
    }

    pub fn record_iteration(&self, id: u64) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.state.iterations_completed += 1;
        }
    }

    /// Marks a loop finished, drops its token and evicts the oldest
    /// finished records beyond [`FINISHED_LOOPS_RETAINED`].
    pub fn finish(&self, id: u64) {
        let mut map = self.entries.lock();
        if let Some(entry) = map.get_mut(&id) {
            entry.state.running = false;
            if let Some(token) = entry.token.take() {
                entry.state.cancelled = token.is_cancelled();
            }
        }
        let finished: Vec<u64> = map
            .values()
            .filter(|e| !e.state.running)
            .map(|e| e.state.id)
            .collect();
        let excess = finished.len().saturating_sub(FINISHED_LOOPS_RETAINED);
        for old in &finished[..excess] {
            map.remove(old);
        }
    }

    /// Cancels a running loop. Finished loops are left untouched.
    pub fn cancel(&self, id: u64) -> CancelOutcome {
        let mut map = self.entries.lock();
        let Some(entry) = map.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };
        match (&entry.token, entry.state.running) {
            (Some(token), true) => {
                token.cancel();
                entry.state.cancelled = true;
                CancelOutcome::Cancelled
            }
            _ => CancelOutcome::NotRunning,
        }
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn status(&self, id: u64) -> Option<LoopState> {
        self.entries.lock().get(&id).map(|e| e.state.clone())
    }

    pub fn active(&self) -> usize {
        self.entries.lock().values().filter(|e| e.state.running).count()
    }

    /// Number of records held, running or finished.
    pub fn retained(&self) -> usize {
        self.entries.lock().len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub memory: MemoryController,
    pub loops: DemoLoops,
    pub settings: Settings,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(settings: Settings, metrics: Metrics) -> Self {
        Self {
            memory: MemoryController::new(metrics.clone()),
            loops: DemoLoops::default(),
            settings,
            metrics,
        }
    }

    /// Startup allocation of `settings.allocate_mb`; zero leaves the slot empty.
    pub fn prime(&self) -> AnyResult<()> {
        let megabytes = self.settings.allocate_mb;
        self.memory
            .allocate(megabytes)
            .with_context(|| format!("startup allocation of {megabytes}MB"))
    }
}

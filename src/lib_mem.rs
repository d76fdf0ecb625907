#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::metrics::Metrics;
use crate::release::release_to_os;
use crate::validation::allocation_bytes;

/// Single allocation slot shared by request handlers and demo loops.
///
/// At most one buffer is tracked. A new allocation replaces the previous
/// one and concurrent callers simply race for the slot.
#[derive(Clone)]
pub struct MemoryController {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
    metrics: Metrics,
}

impl MemoryController {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            metrics,
        }
    }

    /// Allocates `megabytes` MiB and writes every byte. Zero is a no-op.
    pub fn allocate(&self, megabytes: u32) -> AnyResult<()> {
        if megabytes == 0 {
            return Ok(());
        }
        let bytes = allocation_bytes(megabytes)?;
        info!(megabytes, bytes, "allocating memory");
        let buf = match filled_buffer(bytes) {
            Ok(buf) => buf,
            Err(e) => {
                self.metrics.allocation_failures_total.inc();
                return Err(e).with_context(|| format!("allocate {megabytes}MB"));
            }
        };
        let previous = {
            let mut slot = self.slot.lock();
            let previous = slot.replace(buf);
            self.metrics.set_allocated(bytes);
            previous
        };
        self.metrics.allocations_total.inc();
        // dropped outside the lock
        drop(previous);
        Ok(())
    }

    /// Drops the current buffer, if any, and asks the allocator to return
    /// freed pages to the OS.
    pub fn free(&self) {
        let previous = {
            let mut slot = self.slot.lock();
            let previous = slot.take();
            self.metrics.set_allocated(0);
            previous
        };
        let had_allocation = previous.is_some();
        drop(previous);
        self.metrics.frees_total.inc();
        let released = release_to_os();
        info!(had_allocation, released, "freed allocated memory");
    }

    pub fn allocated_bytes(&self) -> Option<usize> {
        self.slot.lock().as_ref().map(Vec::len)
    }

    /// Runs `f` against the current buffer while holding the slot.
    pub fn inspect<R>(&self, f: impl FnOnce(Option<&[u8]>) -> R) -> R {
        let guard = self.slot.lock();
        f(guard.as_deref())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn filled_buffer(bytes: usize) -> AnyResult<Vec<u8>> {
    let mut buf = Vec::<u8>::new();
    buf.try_reserve_exact(bytes)
        .with_context(|| format!("reserve {bytes} bytes"))?;
    // index mod 256 so every page is faulted in with distinct content
    buf.extend((0..bytes).map(|i| i as u8));
    Ok(buf)
}

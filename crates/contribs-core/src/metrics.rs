//! Global atomic counters for fetch and load activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
#[derive(Debug)]
pub struct Metrics {
    fetches_started: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_interrupted: AtomicU64,
    loads_settled: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            fetches_started: AtomicU64::new(0),
            fetches_failed: AtomicU64::new(0),
            fetches_interrupted: AtomicU64::new(0),
            loads_settled: AtomicU64::new(0),
        }
    }

    /// A Fetch Unit issued its gateway call.
    pub fn inc_fetches_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetches_started", "counter incremented");
    }

    /// A gateway call returned an error.
    pub fn inc_fetches_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetches_failed", "counter incremented");
    }

    /// An issued call was abandoned because of cancellation.
    pub fn inc_fetches_interrupted(&self) {
        self.fetches_interrupted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetches_interrupted", "counter incremented");
    }

    /// A load reached its terminal state.
    pub fn inc_loads_settled(&self) {
        self.loads_settled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "loads_settled", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            fetches_started = self.fetches_started(),
            fetches_failed = self.fetches_failed(),
            fetches_interrupted = self.fetches_interrupted(),
            loads_settled = self.loads_settled(),
        );
    }

    pub fn fetches_started(&self) -> u64 {
        self.fetches_started.load(Ordering::Relaxed)
    }

    pub fn fetches_failed(&self) -> u64 {
        self.fetches_failed.load(Ordering::Relaxed)
    }

    pub fn fetches_interrupted(&self) -> u64 {
        self.fetches_interrupted.load(Ordering::Relaxed)
    }

    pub fn loads_settled(&self) -> u64 {
        self.loads_settled.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.fetches_started.store(0, Ordering::Relaxed);
        self.fetches_failed.store(0, Ordering::Relaxed);
        self.fetches_interrupted.store(0, Ordering::Relaxed);
        self.loads_settled.store(0, Ordering::Relaxed);
    }
}

//! Per-stream counters
//!
//! Counts what each aggregator's worker has processed. Shared via `Arc`
//! so supervisors can read them while the worker runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one product's aggregator.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    pub matches_processed: AtomicU64,
    pub opens_acknowledged: AtomicU64,
    pub dones_acknowledged: AtomicU64,
    pub messages_published: AtomicU64,
    pub bootstrap_failures: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_match(&self, messages_published: u64) {
        self.matches_processed.fetch_add(1, Ordering::Relaxed);
        self.messages_published
            .fetch_add(messages_published, Ordering::Relaxed);
    }

    pub fn record_open(&self) {
        self.opens_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_done(&self) {
        self.dones_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap_failure(&self) {
        self.bootstrap_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Total records consumed, all kinds.
    pub fn events_consumed(&self) -> u64 {
        self.matches_processed.load(Ordering::Relaxed)
            + self.opens_acknowledged.load(Ordering::Relaxed)
            + self.dones_acknowledged.load(Ordering::Relaxed)
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("matches_processed".to_string(), self.matches_processed.load(Ordering::Relaxed));
        m.insert("opens_acknowledged".to_string(), self.opens_acknowledged.load(Ordering::Relaxed));
        m.insert("dones_acknowledged".to_string(), self.dones_acknowledged.load(Ordering::Relaxed));
        m.insert("messages_published".to_string(), self.messages_published.load(Ordering::Relaxed));
        m.insert("bootstrap_failures".to_string(), self.bootstrap_failures.load(Ordering::Relaxed));
        m
    }
}

//! Internal metrics collection.
//!
//! In-memory atomic counters, snapshotted periodically into the log by the
//! worker scheduler. No external metrics backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// All pipeline metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    // Intake
    pub events_received: Counter,
    pub events_accepted: Counter,
    pub events_duplicate: Counter,
    pub events_rejected: Counter,
    pub leads_created: Counter,

    // Queue
    pub jobs_enqueued: Counter,
    pub jobs_coalesced: Counter,
    pub jobs_completed: Counter,
    pub jobs_retried: Counter,
    pub jobs_dead_lettered: Counter,
    pub jobs_requeued_stalled: Counter,
    pub jobs_in_flight: Gauge,

    // Scoring
    pub events_scored: Counter,
    pub events_zero_scored: Counter,
    pub apply_skipped_duplicate: Counter,
    pub lease_contention: Counter,

    // Repair
    pub leads_rebuilt: Counter,
    pub jobs_reconciled: Counter,
}

/// Point-in-time metrics snapshot for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub at: DateTime<Utc>,
    pub events_received: u64,
    pub events_accepted: u64,
    pub events_duplicate: u64,
    pub events_rejected: u64,
    pub leads_created: u64,
    pub jobs_enqueued: u64,
    pub jobs_coalesced: u64,
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_requeued_stalled: u64,
    pub jobs_in_flight: u64,
    pub events_scored: u64,
    pub events_zero_scored: u64,
    pub apply_skipped_duplicate: u64,
    pub lease_contention: u64,
    pub leads_rebuilt: u64,
    pub jobs_reconciled: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            at: Utc::now(),
            events_received: self.events_received.get(),
            events_accepted: self.events_accepted.get(),
            events_duplicate: self.events_duplicate.get(),
            events_rejected: self.events_rejected.get(),
            leads_created: self.leads_created.get(),
            jobs_enqueued: self.jobs_enqueued.get(),
            jobs_coalesced: self.jobs_coalesced.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_retried: self.jobs_retried.get(),
            jobs_dead_lettered: self.jobs_dead_lettered.get(),
            jobs_requeued_stalled: self.jobs_requeued_stalled.get(),
            jobs_in_flight: self.jobs_in_flight.get(),
            events_scored: self.events_scored.get(),
            events_zero_scored: self.events_zero_scored.get(),
            apply_skipped_duplicate: self.apply_skipped_duplicate.get(),
            lease_contention: self.lease_contention.get(),
            leads_rebuilt: self.leads_rebuilt.get(),
            jobs_reconciled: self.jobs_reconciled.get(),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Global metrics registry.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

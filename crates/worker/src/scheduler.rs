//! Background maintenance scheduler.
//!
//! Three periodic tasks:
//! - reconciler: re-enqueues leads that hold non-processed events but have no
//!   scheduled job (self-healing for a crash between event insert and
//!   enqueue, or a job lost to coalescing mid-pass);
//! - stale-marker sweep: clears `processing_since` markers left behind by a
//!   crashed worker once they pass the staleness threshold;
//! - metrics log: emits a counters snapshot into the structured log.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use job_queue::JobQueue;
use scoring_core::limits::STALE_PROCESSING_SECS;
use scoring_core::{JobReason, Result, ScoringJob};
use scoring_store::{EventStore, LeadStore, SharedStorage};
use telemetry::metrics;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Reconciliation sweep interval.
    pub reconcile_interval: Duration,
    /// Stale processing-marker sweep interval.
    pub stale_marker_interval: Duration,
    /// Metrics snapshot log interval.
    pub metrics_log_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            stale_marker_interval: Duration::from_secs(60),
            metrics_log_interval: Duration::from_secs(60),
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    storage: SharedStorage,
    queue: Arc<JobQueue>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, storage: SharedStorage, queue: Arc<JobQueue>) -> Self {
        Self {
            config,
            storage,
            queue,
        }
    }

    /// Starts all background tasks.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_reconciler().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_stale_marker_sweep().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        info!("Background workers started");
        handles
    }

    async fn run_reconciler(&self) {
        let mut ticker = interval(self.config.reconcile_interval);
        loop {
            ticker.tick().await;
            match self.reconcile_once().await {
                Ok(0) => {}
                Ok(n) => info!(enqueued = n, "Reconciler replayed stranded leads"),
                Err(e) => error!("Reconciler error: {}", e),
            }
        }
    }

    /// One reconciliation sweep. Returns the number of jobs enqueued.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let events = self.storage.all_events().await?;
        let stranded: HashSet<(Uuid, Uuid)> = events
            .iter()
            .filter(|e| !e.is_processed())
            .map(|e| (e.lead_id, e.project_id))
            .collect();

        let mut enqueued = 0;
        for (lead_id, project_id) in stranded {
            if self.queue.is_scheduled(lead_id) {
                continue;
            }
            self.queue
                .enqueue(ScoringJob::new(lead_id, project_id, JobReason::Reconcile));
            metrics().jobs_reconciled.inc();
            enqueued += 1;
        }
        Ok(enqueued)
    }

    async fn run_stale_marker_sweep(&self) {
        let mut ticker = interval(self.config.stale_marker_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_stale_markers().await {
                error!("Stale marker sweep error: {}", e);
            }
        }
    }

    /// Clear processing markers older than the staleness threshold.
    pub async fn sweep_stale_markers(&self) -> Result<usize> {
        let threshold = Utc::now() - ChronoDuration::seconds(STALE_PROCESSING_SECS);
        let mut cleared = 0;
        for lead in self.storage.all_leads().await? {
            if let Some(since) = lead.processing_since {
                if since < threshold {
                    warn!(
                        lead_id = %lead.id,
                        since = %since,
                        "Clearing stale processing marker"
                    );
                    self.storage.set_processing(lead.id, None).await?;
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(self.config.metrics_log_interval);
        loop {
            ticker.tick().await;
            let snapshot = metrics().snapshot();
            info!(
                events_received = snapshot.events_received,
                events_accepted = snapshot.events_accepted,
                events_duplicate = snapshot.events_duplicate,
                events_rejected = snapshot.events_rejected,
                jobs_enqueued = snapshot.jobs_enqueued,
                jobs_coalesced = snapshot.jobs_coalesced,
                jobs_completed = snapshot.jobs_completed,
                jobs_retried = snapshot.jobs_retried,
                jobs_dead_lettered = snapshot.jobs_dead_lettered,
                jobs_requeued_stalled = snapshot.jobs_requeued_stalled,
                jobs_in_flight = snapshot.jobs_in_flight,
                leads_created = snapshot.leads_created,
                events_scored = snapshot.events_scored,
                events_zero_scored = snapshot.events_zero_scored,
                apply_skipped_duplicate = snapshot.apply_skipped_duplicate,
                lease_contention = snapshot.lease_contention,
                leads_rebuilt = snapshot.leads_rebuilt,
                jobs_reconciled = snapshot.jobs_reconciled,
                queue_depth = self.queue.depth(),
                "Pipeline metrics"
            );
        }
    }
}

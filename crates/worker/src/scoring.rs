//! Scoring worker: drains a lead's unprocessed events under a lease.
//!
//! Apply contract per event, in `occurred_at` order:
//! 1. Look up the active rule for the event type; unknown or inactive types
//!    score zero but are still applied (delta-0 history row, event marked
//!    processed).
//! 2. Clamp the new score into the allowed band and derive the stage.
//! 3. Commit history + aggregate + processed flag as one atomic unit
//!    (`commit_score`). A pre-existing history entry for the pair makes the
//!    commit a no-op, so redelivered jobs never double-score.
//!
//! A failure mid-loop returns the error to the queue: applied events stay
//! applied, pending events are retried with the whole job.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use job_queue::{DeadLetterSink, JobHandler};
use scoring_core::{
    clamp_score,
    limits::{LEASE_TTL_SECS, VELOCITY_WINDOW_HOURS},
    Error, FailedJob, Result, ScoreHistoryEntry, ScoringJob,
};
use scoring_store::{
    CommitOutcome, EventStore, FailedJobStore, LeadStore, LeaseStore, RuleStore, ScoreCommitStore,
    SharedStorage,
};
use telemetry::metrics;

/// The scoring worker. One instance serves the whole queue worker pool.
pub struct ScoringWorker {
    storage: SharedStorage,
    lease_ttl: Duration,
}

impl ScoringWorker {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Run one scoring pass for a lead.
    ///
    /// Holds the per-lead lease for the duration: rebuilds and concurrent
    /// jobs targeting the same lead wait their turn via queue retry.
    pub async fn run_pass(&self, lead_id: Uuid) -> Result<()> {
        if !self.storage.acquire_lease(lead_id, self.lease_ttl).await? {
            metrics().lease_contention.inc();
            return Err(Error::LeaseHeld(lead_id));
        }

        self.storage
            .set_processing(lead_id, Some(Utc::now()))
            .await
            .ok();

        let result = self.apply_pending(lead_id).await;

        // Always release, even on failure; the queue owns the retry.
        self.storage.set_processing(lead_id, None).await.ok();
        self.storage.release_lease(lead_id).await?;
        result
    }

    async fn apply_pending(&self, lead_id: Uuid) -> Result<()> {
        let mut lead = match self.storage.get_lead(lead_id).await? {
            Some(lead) => lead,
            None => {
                // Lead deleted between enqueue and delivery; nothing to score.
                warn!(lead_id = %lead_id, "Scoring job for missing lead");
                return Ok(());
            }
        };

        let events = self.storage.unprocessed_for_lead(lead_id).await?;
        if events.is_empty() {
            debug!(lead_id = %lead_id, "No pending events");
            return Ok(());
        }

        let window_start = Utc::now() - ChronoDuration::hours(VELOCITY_WINDOW_HOURS);
        let mut applied = 0u32;

        for event in events {
            let delta = match self.storage.active_rule(&event.event_type).await? {
                Some(rule) => rule.points,
                None => {
                    // Unknown or inactive event types are not errors; they
                    // score zero and the event is still consumed.
                    metrics().events_zero_scored.inc();
                    0
                }
            };

            let old_score = lead.score;
            let new_score = clamp_score(i64::from(old_score) + i64::from(delta));

            let recent = self
                .storage
                .count_for_lead_since(lead_id, window_start)
                .await?;

            let mut updated = lead.clone();
            updated.apply_score(new_score, event.occurred_at);
            updated.update_velocity(recent);

            let entry = ScoreHistoryEntry::new(lead_id, event.event_id.clone(), old_score, new_score);
            match self.storage.commit_score(entry, updated.clone()).await? {
                CommitOutcome::Applied => {
                    metrics().events_scored.inc();
                    lead = updated;
                    applied += 1;
                }
                CommitOutcome::AlreadyApplied => {
                    // Replay of an already-scored event; the stored aggregate
                    // is authoritative, discard the speculative update.
                    metrics().apply_skipped_duplicate.inc();
                    debug!(
                        lead_id = %lead_id,
                        event_id = %event.event_id,
                        "Event already applied, skipping"
                    );
                }
            }
        }

        info!(
            lead_id = %lead_id,
            applied,
            score = lead.score,
            stage = lead.stage.as_str(),
            "Scoring pass complete"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobHandler for ScoringWorker {
    async fn handle(&self, job: &ScoringJob) -> Result<()> {
        self.run_pass(job.lead_id).await
    }
}

/// Dead-letter sink writing terminal failures to the failed-job store.
pub struct StoreDeadLetterSink {
    storage: SharedStorage,
}

impl StoreDeadLetterSink {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for StoreDeadLetterSink {
    async fn record(&self, job: ScoringJob, attempts: u32, error: &Error) -> Result<()> {
        let failed = FailedJob::new(job, error.to_string(), attempts);
        self.storage.record_failed(failed).await
    }
}

//! Scoring job payloads and the dead-letter record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a scoring job was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReason {
    /// Normal ingestion path.
    Ingest,
    /// Administrative rebuild replay.
    Rebuild,
    /// Periodic reconciliation found stranded events.
    Reconcile,
    /// Operator retried a dead-letter job.
    DeadLetterRetry,
}

impl JobReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Rebuild => "rebuild",
            Self::Reconcile => "reconcile",
            Self::DeadLetterRetry => "dead_letter_retry",
        }
    }
}

/// A unit of scoring work: "drain this lead's unprocessed events".
///
/// The lead ID doubles as the queue dedup key, so any number of events
/// arriving before the worker drains collapse into one pending job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringJob {
    pub lead_id: Uuid,
    pub project_id: Uuid,
    pub reason: JobReason,
}

impl ScoringJob {
    pub fn new(lead_id: Uuid, project_id: Uuid, reason: JobReason) -> Self {
        Self {
            lead_id,
            project_id,
            reason,
        }
    }

    /// Queue dedup key.
    pub fn dedup_key(&self) -> Uuid {
        self.lead_id
    }
}

/// A job that exhausted its retry budget, parked for manual triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    /// Original payload, preserved verbatim for re-enqueue.
    pub job: ScoringJob,
    /// Last handler error before exhaustion.
    pub last_error: String,
    /// Delivery attempts consumed.
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    /// Set once an operator re-enqueues this job; a second retry is rejected.
    pub retried: bool,
}

impl FailedJob {
    pub fn new(job: ScoringJob, last_error: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            last_error: last_error.into(),
            attempts,
            failed_at: Utc::now(),
            retried: false,
        }
    }
}

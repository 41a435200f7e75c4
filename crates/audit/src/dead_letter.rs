//! Dead-letter management: inspect and retry terminally failed jobs.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use job_queue::JobQueue;
use scoring_core::{Error, FailedJob, JobReason, Result, ScoringJob};
use scoring_store::{FailedJobStore, SharedStorage};

/// Operator interface over the dead-letter sink.
pub struct DeadLetterManager {
    storage: SharedStorage,
    queue: Arc<JobQueue>,
}

impl DeadLetterManager {
    pub fn new(storage: SharedStorage, queue: Arc<JobQueue>) -> Self {
        Self { storage, queue }
    }

    /// List failed jobs, newest first, optionally filtered by retried state.
    pub async fn list(&self, retried: Option<bool>) -> Result<Vec<FailedJob>> {
        self.storage.list_failed(retried).await
    }

    /// Retry one failed job: re-enqueue its original payload and mark it
    /// retried. A job can be retried once; further retries are rejected.
    pub async fn retry(&self, id: Uuid) -> Result<()> {
        let failed = self
            .storage
            .get_failed(id)
            .await?
            .ok_or_else(|| Error::not_found("failed job", id.to_string()))?;

        if failed.retried {
            return Err(Error::AlreadyRetried(id));
        }

        self.queue.enqueue(ScoringJob::new(
            failed.job.lead_id,
            failed.job.project_id,
            JobReason::DeadLetterRetry,
        ));
        self.storage.mark_retried(id).await?;

        info!(
            failed_job_id = %id,
            lead_id = %failed.job.lead_id,
            attempts = failed.attempts,
            "Dead-letter job re-enqueued"
        );
        Ok(())
    }
}

//! Rebuild: regenerate a lead's derived state from its immutable events.
//!
//! Safe because events are immutable and history plus the aggregate are
//! fully re-derivable from the event log and the current rule store. The
//! rebuild acquires the same per-lead lease the scoring worker uses, so a
//! rebuild never races an in-flight scoring pass.
//!
//! The call returns counts immediately; the actual rescoring happens
//! asynchronously through the normal queue path.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use job_queue::JobQueue;
use scoring_core::limits::LEASE_TTL_SECS;
use scoring_core::{Error, JobReason, Result, ScoringJob};
use scoring_store::{EventStore, HistoryStore, LeadStore, LeaseStore, SharedStorage};
use telemetry::metrics;

/// Counts of rows affected by a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RebuildSummary {
    pub leads_rebuilt: u64,
    pub history_deleted: u64,
    pub events_reset: u64,
}

/// Administrative rebuild operations.
pub struct RebuildService {
    storage: SharedStorage,
    queue: Arc<JobQueue>,
    lease_ttl: Duration,
}

impl RebuildService {
    pub fn new(storage: SharedStorage, queue: Arc<JobQueue>) -> Self {
        Self {
            storage,
            queue,
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Rebuild one lead: delete its history, zero the aggregate, reset its
    /// events, and re-enqueue a scoring job.
    pub async fn rebuild_lead(&self, lead_id: Uuid) -> Result<RebuildSummary> {
        let mut lead = self
            .storage
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| Error::not_found("lead", lead_id.to_string()))?;

        let project_id = lead.project_id;

        if !self.storage.acquire_lease(lead_id, self.lease_ttl).await? {
            return Err(Error::LeaseHeld(lead_id));
        }

        let result = async {
            let history_deleted = self.storage.delete_history_for_lead(lead_id).await?;
            lead.reset_derived();
            self.storage.put_lead(lead).await?;
            let events_reset = self.storage.reset_events_for_lead(lead_id).await?;
            Ok::<_, Error>((history_deleted, events_reset))
        }
        .await;

        self.storage.release_lease(lead_id).await?;
        let (history_deleted, events_reset) = result?;

        self.queue
            .enqueue(ScoringJob::new(lead_id, project_id, JobReason::Rebuild));
        metrics().leads_rebuilt.inc();

        info!(
            lead_id = %lead_id,
            history_deleted,
            events_reset,
            "Lead rebuild scheduled"
        );
        Ok(RebuildSummary {
            leads_rebuilt: 1,
            history_deleted,
            events_reset,
        })
    }

    /// Rebuild every lead in a project. Stops at the first error; already
    /// rebuilt leads stay rebuilt (each lead is independently recoverable).
    pub async fn rebuild_project(&self, project_id: Uuid) -> Result<RebuildSummary> {
        let leads = self.storage.leads_for_project(project_id).await?;
        let mut summary = RebuildSummary::default();

        for lead in leads {
            let one = self.rebuild_lead(lead.id).await?;
            summary.leads_rebuilt += one.leads_rebuilt;
            summary.history_deleted += one.history_deleted;
            summary.events_reset += one.events_reset;
        }

        info!(
            project_id = %project_id,
            leads = summary.leads_rebuilt,
            "Project rebuild scheduled"
        );
        Ok(summary)
    }
}

//! Intake gateway: the write path of the pipeline.
//!
//! Order of operations per submission:
//! 1. Structural validation (no writes on failure).
//! 2. Credential resolution (no writes on failure).
//! 3. Atomic lead upsert by `(project, anonymous_id)`.
//! 4. Event insert; a store duplicate is the idempotency signal and the call
//!    returns "already accepted".
//! 5. Job enqueue keyed by lead ID (coalesces), then mark the event queued.
//!
//! The call returns once the event and job are durably acknowledged, never
//! after scoring completes. A crash between steps 4 and 5 leaves a recorded
//! event with no job; the reconciler replays it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use job_queue::{EnqueueOutcome, JobQueue};
use scoring_core::{
    collect_field_errors, Error, EventRecord, EventStatus, EventSubmission, JobReason,
    LeadIdentity, ProjectKey, Result, ScoringJob, SubmissionOutcome,
};
use scoring_store::{EventStore, InsertOutcome, LeadStore, SharedStorage};
use telemetry::metrics;

/// The intake gateway. Shared by whatever transport feeds the pipeline.
pub struct IntakeGateway {
    storage: SharedStorage,
    queue: Arc<JobQueue>,
    keyring: Arc<crate::keyring::ProjectKeyring>,
}

impl IntakeGateway {
    pub fn new(
        storage: SharedStorage,
        queue: Arc<JobQueue>,
        keyring: Arc<crate::keyring::ProjectKeyring>,
    ) -> Self {
        Self {
            storage,
            queue,
            keyring,
        }
    }

    /// Accept a candidate event.
    ///
    /// Fails closed: any validation or auth error happens before the first
    /// write. After this returns `Accepted` or `Duplicate`, exactly one
    /// durable event row exists for the submission's event ID and at most one
    /// pending scoring job exists for the lead.
    pub async fn submit(&self, submission: EventSubmission) -> Result<SubmissionOutcome> {
        metrics().events_received.inc();

        if let Err(errors) = submission.validate() {
            metrics().events_rejected.inc();
            return Err(Error::validation(collect_field_errors(&errors)));
        }

        let key = ProjectKey::parse(&submission.api_key).inspect_err(|_| {
            metrics().events_rejected.inc();
        })?;
        let project_id = self.keyring.resolve(&key).inspect_err(|_| {
            metrics().events_rejected.inc();
        })?;

        let identity = LeadIdentity {
            anonymous_id: submission.anonymous_id.clone(),
            email: submission.email.clone(),
        };
        let (lead, created) = self.storage.upsert_lead(project_id, identity).await?;
        if created {
            metrics().leads_created.inc();
            debug!(lead_id = %lead.id, project_id = %project_id, "Lead created on first touch");
        }

        let event_id = submission
            .event_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();
        let event = EventRecord {
            event_id: event_id.clone(),
            lead_id: lead.id,
            project_id,
            event_type: submission.event_type.clone(),
            session_id: submission.session_id.clone(),
            properties: submission.properties.clone().unwrap_or(serde_json::Value::Null),
            occurred_at: submission.occurred_at.unwrap_or(now),
            received_at: now,
            status: EventStatus::Received,
        };

        match self.storage.insert_event(event).await? {
            InsertOutcome::Duplicate => {
                // Idempotent no-op: the earlier submission already owns the
                // scoring job for this event.
                metrics().events_duplicate.inc();
                debug!(
                    event_id = %event_id,
                    lead_id = %lead.id,
                    "Duplicate event, already accepted"
                );
                return Ok(SubmissionOutcome::Duplicate {
                    event_id,
                    lead_id: lead.id,
                });
            }
            InsertOutcome::Inserted => {}
        }

        let enqueued = self
            .queue
            .enqueue(ScoringJob::new(lead.id, project_id, JobReason::Ingest));
        if let Err(err) = self
            .storage
            .mark_event_queued(project_id, &event_id)
            .await
        {
            // The event row exists and a job is pending, so scoring still
            // happens; the flag catches up when the worker processes it.
            warn!(event_id = %event_id, error = %err, "Failed to flag event queued");
        }

        metrics().events_accepted.inc();
        info!(
            event_id = %event_id,
            lead_id = %lead.id,
            project_id = %project_id,
            event_type = %submission.event_type,
            coalesced = enqueued == EnqueueOutcome::Coalesced,
            "Event accepted"
        );

        Ok(SubmissionOutcome::Accepted {
            event_id,
            lead_id: lead.id,
        })
    }
}

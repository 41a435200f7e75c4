//! Event record: the immutable facts the pipeline is built on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a recorded event.
///
/// An event is created `Received`, becomes `Queued` once a scoring job has
/// been enqueued for its lead, and becomes `Processed` exactly once when the
/// scoring worker applies it. No other field of an event ever changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Received,
    Queued,
    Processed,
}

/// A recorded behavioral event.
///
/// `event_id` is unique within a project for all time; the store enforces
/// this and the constraint is the idempotency anchor for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Client- or server-generated event ID, unique per project.
    pub event_id: String,
    /// Owning lead.
    pub lead_id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Event type tag, matched against the rule store at apply time.
    pub event_type: String,
    /// Optional session correlation ID.
    pub session_id: Option<String>,
    /// Free-form properties (size/depth/key-count bounded at intake).
    pub properties: serde_json::Value,
    /// Client-reported wall-clock time; the apply order within a lead.
    pub occurred_at: DateTime<Utc>,
    /// Server receive timestamp.
    pub received_at: DateTime<Utc>,
    /// Lifecycle flag.
    pub status: EventStatus,
}

impl EventRecord {
    /// Store key: `(project_id, event_id)`.
    pub fn key(&self) -> (Uuid, String) {
        (self.project_id, self.event_id.clone())
    }

    pub fn is_processed(&self) -> bool {
        self.status == EventStatus::Processed
    }
}

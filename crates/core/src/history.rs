//! Score history: the immutable audit trail of score transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One score transition, written by the scoring worker per applied event.
///
/// At most one entry exists per `(lead_id, event_id)` pair; the store rejects
/// a second append for the same pair. Entries are never updated, and deleted
/// only by an explicit rebuild (which regenerates the full set for a lead).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreHistoryEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Source event (client-scoped ID, unique within the project).
    pub event_id: String,
    pub old_score: i32,
    pub new_score: i32,
    /// Applied delta after clamping: `new_score - old_score`.
    pub delta: i32,
    pub recorded_at: DateTime<Utc>,
}

impl ScoreHistoryEntry {
    pub fn new(lead_id: Uuid, event_id: impl Into<String>, old_score: i32, new_score: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            event_id: event_id.into(),
            old_score,
            new_score,
            delta: new_score - old_score,
            recorded_at: Utc::now(),
        }
    }
}

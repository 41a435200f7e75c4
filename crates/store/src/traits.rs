//! Storage trait seams, one per durable collection.
//!
//! The in-memory backend in this crate implements all of them; a persistent
//! backend plugs in behind the same seams. Every uniqueness guarantee the
//! pipeline relies on lives here, not in callers:
//! - events are unique per `(project_id, event_id)`;
//! - leads are unique per `(project_id, anonymous_id)` with atomic
//!   insert-if-absent;
//! - history entries are unique per `(lead_id, event_id)`;
//! - the per-event apply is one atomic commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use scoring_core::{
    EventRecord, FailedJob, Lead, LeadIdentity, Result, ScoreHistoryEntry, ScoringRule,
};

/// Outcome of a uniqueness-constrained insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key already exists. On the ingestion path this is the idempotency
    /// signal, not an error.
    Duplicate,
}

/// Outcome of a per-event score commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// A history entry for this `(lead, event)` pair already existed; the
    /// event was marked processed but no state changed.
    AlreadyApplied,
}

/// Append-only event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event, enforcing `(project_id, event_id)` uniqueness.
    async fn insert_event(&self, event: EventRecord) -> Result<InsertOutcome>;

    /// Flag an event as queued after its scoring job is enqueued.
    async fn mark_event_queued(&self, project_id: Uuid, event_id: &str) -> Result<()>;

    async fn get_event(&self, project_id: Uuid, event_id: &str) -> Result<Option<EventRecord>>;

    /// All non-processed events for a lead, ordered by `occurred_at` ascending.
    async fn unprocessed_for_lead(&self, lead_id: Uuid) -> Result<Vec<EventRecord>>;

    /// All events for a lead regardless of state, ordered by `occurred_at`.
    async fn events_for_lead(&self, lead_id: Uuid) -> Result<Vec<EventRecord>>;

    /// Count of events for a lead with `occurred_at >= since`.
    async fn count_for_lead_since(&self, lead_id: Uuid, since: DateTime<Utc>) -> Result<u32>;

    /// Reset all of a lead's events to unprocessed. Returns the number of
    /// events whose flag changed. Used by rebuild.
    async fn reset_events_for_lead(&self, lead_id: Uuid) -> Result<u64>;

    /// Full scan for the invariant checker.
    async fn all_events(&self) -> Result<Vec<EventRecord>>;
}

/// Mutable lead aggregates.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Resolve-or-create by `(project_id, anonymous_id)` as a single atomic
    /// operation. Returns the lead and whether it was created. A submission
    /// carrying an email for an email-less existing lead merges it here.
    async fn upsert_lead(&self, project_id: Uuid, identity: LeadIdentity) -> Result<(Lead, bool)>;

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>>;

    /// Replace the stored aggregate.
    async fn put_lead(&self, lead: Lead) -> Result<()>;

    /// Set or clear the soft processing marker.
    async fn set_processing(&self, lead_id: Uuid, since: Option<DateTime<Utc>>) -> Result<()>;

    async fn leads_for_project(&self, project_id: Uuid) -> Result<Vec<Lead>>;

    /// Full scan for the invariant checker.
    async fn all_leads(&self) -> Result<Vec<Lead>>;
}

/// Append-only score history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn history_exists(&self, lead_id: Uuid, event_id: &str) -> Result<bool>;

    /// History for a lead in recorded order.
    async fn history_for_lead(&self, lead_id: Uuid) -> Result<Vec<ScoreHistoryEntry>>;

    /// Most recently recorded entry for a lead.
    async fn latest_history(&self, lead_id: Uuid) -> Result<Option<ScoreHistoryEntry>>;

    /// Delete all history for a lead. Returns the count. Rebuild only.
    async fn delete_history_for_lead(&self, lead_id: Uuid) -> Result<u64>;

    /// Full scan for the invariant checker.
    async fn all_history(&self) -> Result<Vec<ScoreHistoryEntry>>;
}

/// Scoring rule configuration.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// The active rule for an event type, if any. Inactive rules are not
    /// returned; unknown types yield `None`.
    async fn active_rule(&self, event_type: &str) -> Result<Option<ScoringRule>>;

    /// Create or replace a rule keyed by event type.
    async fn upsert_rule(&self, rule: ScoringRule) -> Result<()>;

    /// Enable or disable a rule.
    async fn set_rule_active(&self, event_type: &str, active: bool) -> Result<()>;

    /// Delete a rule. Returns whether it existed.
    async fn delete_rule(&self, event_type: &str) -> Result<bool>;

    async fn list_rules(&self) -> Result<Vec<ScoringRule>>;
}

/// Dead-letter records.
#[async_trait]
pub trait FailedJobStore: Send + Sync {
    async fn record_failed(&self, job: FailedJob) -> Result<()>;

    /// List failed jobs, newest first, optionally filtered by retried state.
    async fn list_failed(&self, retried: Option<bool>) -> Result<Vec<FailedJob>>;

    async fn get_failed(&self, id: Uuid) -> Result<Option<FailedJob>>;

    /// Flip the retried flag. `NotFound` if the record does not exist.
    async fn mark_retried(&self, id: Uuid) -> Result<()>;
}

/// Per-lead processing leases.
///
/// A lease admits exactly one scoring pass per lead at a time, across every
/// enqueue source. Expiry bounds how long a crashed worker can block a lead.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Try to acquire the lease for a lead. Returns false if a live lease is
    /// already held. Expired leases are treated as free.
    async fn acquire_lease(&self, lead_id: Uuid, ttl: Duration) -> Result<bool>;

    async fn release_lease(&self, lead_id: Uuid) -> Result<()>;
}

/// The per-event apply commit.
#[async_trait]
pub trait ScoreCommitStore: Send + Sync {
    /// Atomically: append the history entry, persist the updated lead
    /// aggregate, and mark the source event processed.
    ///
    /// If a history entry for `(entry.lead_id, entry.event_id)` already
    /// exists, nothing is written except the event's processed flag and
    /// `AlreadyApplied` is returned, so redelivered jobs converge without
    /// double-scoring. A crash before this call leaves the event pending; a
    /// crash after leaves it fully applied. There is no partial state.
    async fn commit_score(&self, entry: ScoreHistoryEntry, lead: Lead) -> Result<CommitOutcome>;
}

/// Everything the pipeline needs from a storage backend.
pub trait Storage:
    EventStore
    + LeadStore
    + HistoryStore
    + RuleStore
    + FailedJobStore
    + LeaseStore
    + ScoreCommitStore
{
}

impl<T> Storage for T where
    T: EventStore
        + LeadStore
        + HistoryStore
        + RuleStore
        + FailedJobStore
        + LeaseStore
        + ScoreCommitStore
{
}

/// Shared handle to a storage backend.
pub type SharedStorage = std::sync::Arc<dyn Storage>;

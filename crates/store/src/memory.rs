//! In-memory storage backend.
//!
//! Reference implementation of the storage seams, also used by the test
//! suites. One write lock guards all collections, which makes the atomic
//! guarantees trivial: the lead upsert, the event insert, and the per-event
//! score commit each run under a single critical section.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use async_trait::async_trait;
use scoring_core::{
    Error, EventRecord, EventStatus, FailedJob, Lead, LeadIdentity, Result, ScoreHistoryEntry,
    ScoringRule,
};

use crate::traits::{
    CommitOutcome, EventStore, FailedJobStore, HistoryStore, InsertOutcome, LeadStore, LeaseStore,
    RuleStore, ScoreCommitStore,
};

#[derive(Default)]
struct Inner {
    /// Events keyed by `(project_id, event_id)`.
    events: HashMap<(Uuid, String), EventRecord>,
    /// Leads keyed by ID.
    leads: HashMap<Uuid, Lead>,
    /// Identity index: `(project_id, anonymous_id)` → lead ID.
    lead_index: HashMap<(Uuid, String), Uuid>,
    /// History per lead, in append order.
    history: HashMap<Uuid, Vec<ScoreHistoryEntry>>,
    /// Uniqueness set for `(lead_id, event_id)` pairs.
    history_pairs: HashSet<(Uuid, String)>,
    /// Rules keyed by event type.
    rules: HashMap<String, ScoringRule>,
    /// Dead-letter records keyed by ID.
    failed: HashMap<Uuid, FailedJob>,
    /// Lease expiry per lead.
    leases: HashMap<Uuid, DateTime<Utc>>,
}

/// In-memory backend implementing every storage seam.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: EventRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.write();
        let key = event.key();
        if inner.events.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.events.insert(key, event);
        Ok(InsertOutcome::Inserted)
    }

    async fn mark_event_queued(&self, project_id: Uuid, event_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let event = inner
            .events
            .get_mut(&(project_id, event_id.to_string()))
            .ok_or_else(|| Error::not_found("event", event_id))?;
        // Never regress a processed event back to queued.
        if event.status == EventStatus::Received {
            event.status = EventStatus::Queued;
        }
        Ok(())
    }

    async fn get_event(&self, project_id: Uuid, event_id: &str) -> Result<Option<EventRecord>> {
        let inner = self.inner.read();
        Ok(inner.events.get(&(project_id, event_id.to_string())).cloned())
    }

    async fn unprocessed_for_lead(&self, lead_id: Uuid) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read();
        let mut events: Vec<EventRecord> = inner
            .events
            .values()
            .filter(|e| e.lead_id == lead_id && e.status != EventStatus::Processed)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(events)
    }

    async fn events_for_lead(&self, lead_id: Uuid) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read();
        let mut events: Vec<EventRecord> = inner
            .events
            .values()
            .filter(|e| e.lead_id == lead_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(events)
    }

    async fn count_for_lead_since(&self, lead_id: Uuid, since: DateTime<Utc>) -> Result<u32> {
        let inner = self.inner.read();
        let count = inner
            .events
            .values()
            .filter(|e| e.lead_id == lead_id && e.occurred_at >= since)
            .count();
        Ok(count as u32)
    }

    async fn reset_events_for_lead(&self, lead_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write();
        let mut reset = 0;
        for event in inner.events.values_mut() {
            if event.lead_id == lead_id && event.status != EventStatus::Received {
                event.status = EventStatus::Received;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn all_events(&self) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read();
        Ok(inner.events.values().cloned().collect())
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn upsert_lead(&self, project_id: Uuid, identity: LeadIdentity) -> Result<(Lead, bool)> {
        let mut inner = self.inner.write();
        let index_key = (project_id, identity.anonymous_id.clone());

        if let Some(&lead_id) = inner.lead_index.get(&index_key) {
            let lead = inner
                .leads
                .get_mut(&lead_id)
                .ok_or_else(|| Error::internal("lead index points at missing lead"))?;
            // Identity resolution: first email seen wins.
            if lead.email.is_none() {
                if let Some(email) = identity.email {
                    lead.email = Some(email);
                    lead.updated_at = Utc::now();
                }
            }
            return Ok((lead.clone(), false));
        }

        let lead = Lead::new(project_id, identity);
        inner.lead_index.insert(index_key, lead.id);
        inner.leads.insert(lead.id, lead.clone());
        Ok((lead, true))
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>> {
        let inner = self.inner.read();
        Ok(inner.leads.get(&lead_id).cloned())
    }

    async fn put_lead(&self, lead: Lead) -> Result<()> {
        let mut inner = self.inner.write();
        inner.leads.insert(lead.id, lead);
        Ok(())
    }

    async fn set_processing(&self, lead_id: Uuid, since: Option<DateTime<Utc>>) -> Result<()> {
        let mut inner = self.inner.write();
        let lead = inner
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| Error::not_found("lead", lead_id.to_string()))?;
        lead.processing_since = since;
        Ok(())
    }

    async fn leads_for_project(&self, project_id: Uuid) -> Result<Vec<Lead>> {
        let inner = self.inner.read();
        let mut leads: Vec<Lead> = inner
            .leads
            .values()
            .filter(|l| l.project_id == project_id)
            .cloned()
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(leads)
    }

    async fn all_leads(&self) -> Result<Vec<Lead>> {
        let inner = self.inner.read();
        Ok(inner.leads.values().cloned().collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn history_exists(&self, lead_id: Uuid, event_id: &str) -> Result<bool> {
        let inner = self.inner.read();
        Ok(inner
            .history_pairs
            .contains(&(lead_id, event_id.to_string())))
    }

    async fn history_for_lead(&self, lead_id: Uuid) -> Result<Vec<ScoreHistoryEntry>> {
        let inner = self.inner.read();
        Ok(inner.history.get(&lead_id).cloned().unwrap_or_default())
    }

    async fn latest_history(&self, lead_id: Uuid) -> Result<Option<ScoreHistoryEntry>> {
        let inner = self.inner.read();
        Ok(inner
            .history
            .get(&lead_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn delete_history_for_lead(&self, lead_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write();
        let removed = inner.history.remove(&lead_id).map(|v| v.len()).unwrap_or(0);
        inner.history_pairs.retain(|(lid, _)| *lid != lead_id);
        Ok(removed as u64)
    }

    async fn all_history(&self) -> Result<Vec<ScoreHistoryEntry>> {
        let inner = self.inner.read();
        Ok(inner.history.values().flatten().cloned().collect())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rule(&self, event_type: &str) -> Result<Option<ScoringRule>> {
        let inner = self.inner.read();
        Ok(inner
            .rules
            .get(event_type)
            .filter(|r| r.active)
            .cloned())
    }

    async fn upsert_rule(&self, rule: ScoringRule) -> Result<()> {
        let mut inner = self.inner.write();
        inner.rules.insert(rule.event_type.clone(), rule);
        Ok(())
    }

    async fn set_rule_active(&self, event_type: &str, active: bool) -> Result<()> {
        let mut inner = self.inner.write();
        let rule = inner
            .rules
            .get_mut(event_type)
            .ok_or_else(|| Error::not_found("rule", event_type))?;
        rule.active = active;
        Ok(())
    }

    async fn delete_rule(&self, event_type: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        Ok(inner.rules.remove(event_type).is_some())
    }

    async fn list_rules(&self) -> Result<Vec<ScoringRule>> {
        let inner = self.inner.read();
        let mut rules: Vec<ScoringRule> = inner.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        Ok(rules)
    }
}

#[async_trait]
impl FailedJobStore for MemoryStore {
    async fn record_failed(&self, job: FailedJob) -> Result<()> {
        let mut inner = self.inner.write();
        inner.failed.insert(job.id, job);
        Ok(())
    }

    async fn list_failed(&self, retried: Option<bool>) -> Result<Vec<FailedJob>> {
        let inner = self.inner.read();
        let mut jobs: Vec<FailedJob> = inner
            .failed
            .values()
            .filter(|j| retried.map_or(true, |r| j.retried == r))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(jobs)
    }

    async fn get_failed(&self, id: Uuid) -> Result<Option<FailedJob>> {
        let inner = self.inner.read();
        Ok(inner.failed.get(&id).cloned())
    }

    async fn mark_retried(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        let job = inner
            .failed
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("failed job", id.to_string()))?;
        job.retried = true;
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn acquire_lease(&self, lead_id: Uuid, ttl: Duration) -> Result<bool> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        if let Some(expiry) = inner.leases.get(&lead_id) {
            if *expiry > now {
                return Ok(false);
            }
        }
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| Error::internal(format!("lease ttl out of range: {e}")))?;
        inner.leases.insert(lead_id, now + ttl);
        Ok(true)
    }

    async fn release_lease(&self, lead_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        inner.leases.remove(&lead_id);
        Ok(())
    }
}

#[async_trait]
impl ScoreCommitStore for MemoryStore {
    async fn commit_score(&self, entry: ScoreHistoryEntry, lead: Lead) -> Result<CommitOutcome> {
        let mut inner = self.inner.write();
        let event_key = (lead.project_id, entry.event_id.clone());
        if !inner.events.contains_key(&event_key) {
            return Err(Error::not_found("event", entry.event_id));
        }

        let pair = (entry.lead_id, entry.event_id.clone());
        if inner.history_pairs.contains(&pair) {
            // Redelivery converges: flag the event, write nothing else.
            if let Some(event) = inner.events.get_mut(&event_key) {
                event.status = EventStatus::Processed;
            }
            return Ok(CommitOutcome::AlreadyApplied);
        }

        inner.history_pairs.insert(pair);
        inner.history.entry(entry.lead_id).or_default().push(entry);
        if let Some(event) = inner.events.get_mut(&event_key) {
            event.status = EventStatus::Processed;
        }
        inner.leads.insert(lead.id, lead);
        Ok(CommitOutcome::Applied)
    }
}

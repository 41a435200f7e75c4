//! Invariant checker: read-only drift detection across the three stores.
//!
//! The checker never mutates state and never raises drift as an error; every
//! violation becomes a structured finding with a bounded sample of offending
//! record keys. Remediation is always an explicit rebuild.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use scoring_core::limits::STALE_PROCESSING_SECS;
use scoring_core::Result;
use scoring_store::{EventStore, HistoryStore, LeadStore, SharedStorage};

/// Offending records included per finding, at most.
pub const MAX_SAMPLE: usize = 10;

/// The audited invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    /// Two history entries share a `(lead, event)` pair.
    DuplicateHistoryPair,
    /// A processed event has no history entry.
    ProcessedWithoutHistory,
    /// A history entry references a nonexistent event.
    OrphanHistory,
    /// A lead's score differs from its latest history entry.
    ScoreOutOfSync,
    /// A lead has held its processing marker past the staleness threshold.
    StaleProcessing,
}

impl Invariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateHistoryPair => "duplicate_history_pair",
            Self::ProcessedWithoutHistory => "processed_without_history",
            Self::OrphanHistory => "orphan_history",
            Self::ScoreOutOfSync => "score_out_of_sync",
            Self::StaleProcessing => "stale_processing",
        }
    }
}

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable by the reconciler or sweep on its own.
    Warning,
    /// Requires an operator-triggered rebuild.
    Critical,
}

/// One invariant violation with a bounded sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub invariant: Invariant,
    pub severity: Severity,
    /// Total offending records.
    pub count: usize,
    /// Up to [`MAX_SAMPLE`] offending record keys.
    pub sample: Vec<String>,
}

impl Finding {
    fn new(invariant: Invariant, severity: Severity, mut offenders: Vec<String>) -> Self {
        let count = offenders.len();
        offenders.sort();
        offenders.truncate(MAX_SAMPLE);
        Self {
            invariant,
            severity,
            count,
            sample: offenders,
        }
    }
}

/// Full checker output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantReport {
    pub checked_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
}

impl InvariantReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn finding(&self, invariant: Invariant) -> Option<&Finding> {
        self.findings.iter().find(|f| f.invariant == invariant)
    }
}

/// Read-only auditor over the event log, history log, and lead aggregates.
pub struct InvariantChecker {
    storage: SharedStorage,
}

impl InvariantChecker {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Run all checks and return the report.
    pub async fn run(&self) -> Result<InvariantReport> {
        let events = self.storage.all_events().await?;
        let history = self.storage.all_history().await?;
        let leads = self.storage.all_leads().await?;

        let mut findings = Vec::new();

        // (1) Duplicate (lead, event) history pairs.
        let mut pair_counts: HashMap<(Uuid, &str), usize> = HashMap::new();
        for entry in &history {
            *pair_counts
                .entry((entry.lead_id, entry.event_id.as_str()))
                .or_default() += 1;
        }
        let duplicates: Vec<String> = pair_counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|((lead, event), _)| format!("{lead}/{event}"))
            .collect();
        if !duplicates.is_empty() {
            findings.push(Finding::new(
                Invariant::DuplicateHistoryPair,
                Severity::Critical,
                duplicates,
            ));
        }

        let history_pairs: HashSet<(Uuid, &str)> = history
            .iter()
            .map(|e| (e.lead_id, e.event_id.as_str()))
            .collect();

        // (2) Processed events must have a history entry.
        let unhistoried: Vec<String> = events
            .iter()
            .filter(|e| e.is_processed())
            .filter(|e| !history_pairs.contains(&(e.lead_id, e.event_id.as_str())))
            .map(|e| format!("{}/{}", e.lead_id, e.event_id))
            .collect();
        if !unhistoried.is_empty() {
            findings.push(Finding::new(
                Invariant::ProcessedWithoutHistory,
                Severity::Critical,
                unhistoried,
            ));
        }

        // (3) History entries must reference existing events.
        let event_pairs: HashSet<(Uuid, &str)> = events
            .iter()
            .map(|e| (e.lead_id, e.event_id.as_str()))
            .collect();
        let orphans: Vec<String> = history
            .iter()
            .filter(|h| !event_pairs.contains(&(h.lead_id, h.event_id.as_str())))
            .map(|h| format!("{}/{}", h.lead_id, h.event_id))
            .collect();
        if !orphans.is_empty() {
            findings.push(Finding::new(
                Invariant::OrphanHistory,
                Severity::Critical,
                orphans,
            ));
        }

        // (4) Lead score must match its latest history entry.
        let mut out_of_sync = Vec::new();
        for lead in &leads {
            let expected = self
                .storage
                .latest_history(lead.id)
                .await?
                .map(|entry| entry.new_score)
                .unwrap_or(0);
            if lead.score != expected {
                out_of_sync.push(lead.id.to_string());
            }
        }
        if !out_of_sync.is_empty() {
            findings.push(Finding::new(
                Invariant::ScoreOutOfSync,
                Severity::Critical,
                out_of_sync,
            ));
        }

        // (5) Stale processing markers.
        let threshold = Utc::now() - ChronoDuration::seconds(STALE_PROCESSING_SECS);
        let stale: Vec<String> = leads
            .iter()
            .filter(|l| l.processing_since.is_some_and(|since| since < threshold))
            .map(|l| l.id.to_string())
            .collect();
        if !stale.is_empty() {
            findings.push(Finding::new(
                Invariant::StaleProcessing,
                Severity::Warning,
                stale,
            ));
        }

        debug!(findings = findings.len(), "Invariant check complete");
        Ok(InvariantReport {
            checked_at: Utc::now(),
            findings,
        })
    }
}

//! Scoring rules: the event-type → point-delta table.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A scoring rule. `event_type` is the unique key.
///
/// Rules are read by the worker on every event application, so edits take
/// effect on the next event processed. There is no retroactive rescoring
/// unless an explicit rebuild is triggered.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScoringRule {
    /// Event type this rule matches.
    #[validate(length(min = 1, max = 100))]
    pub event_type: String,
    /// Human-readable label.
    #[validate(length(min = 1, max = 200))]
    pub label: String,
    /// Signed point delta applied per matching event.
    pub points: i32,
    /// Inactive rules are skipped (matching events score zero).
    pub active: bool,
}

impl ScoringRule {
    pub fn new(event_type: impl Into<String>, label: impl Into<String>, points: i32) -> Self {
        Self {
            event_type: event_type.into(),
            label: label.into(),
            points,
            active: true,
        }
    }
}

/// Reference rule set seeded into a fresh deployment.
pub fn default_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new("page_view", "Viewed a page", 1),
        ScoringRule::new("pricing_view", "Viewed pricing", 10),
        ScoringRule::new("demo_request", "Requested a demo", 30),
        ScoringRule::new("form_submit", "Submitted a form", 15),
        ScoringRule::new("email_open", "Opened an email", 2),
        ScoringRule::new("email_click", "Clicked an email link", 5),
        ScoringRule::new("unsubscribe", "Unsubscribed", -20),
    ]
}

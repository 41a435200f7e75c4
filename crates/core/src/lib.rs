//! Core types, schemas, and validation for the lead scoring engine.

pub mod auth;
pub mod error;
pub mod event;
pub mod history;
pub mod job;
pub mod lead;
pub mod limits;
pub mod rule;
pub mod submission;

pub use auth::{ApiKeyEnv, ProjectKey};
pub use error::{Error, FieldError, Result};
pub use event::{EventRecord, EventStatus};
pub use history::ScoreHistoryEntry;
pub use job::{FailedJob, JobReason, ScoringJob};
pub use lead::{clamp_score, Lead, LeadIdentity, Stage};
pub use rule::{default_rules, ScoringRule};
pub use submission::{collect_field_errors, EventSubmission, SubmissionOutcome};

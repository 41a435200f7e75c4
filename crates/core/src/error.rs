//! Unified error types for the scoring pipeline.
//!
//! The taxonomy mirrors how callers must react:
//! - `Validation` / `Auth`: rejected synchronously, no side effects.
//! - `Duplicate`: not a failure; surfaced so callers can report
//!   "already accepted" (the ingestion path converts it to a success).
//! - `Unavailable`: transient infrastructure failure, safe to retry.
//! - `LeaseHeld`: another pass owns the lead right now, safe to retry.
//! - `Invariant` drift is never an `Error`; it is reported as checker
//!   findings only.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    /// Field path, e.g. `properties` or `identity.email`.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Unified error type for the scoring engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural validation failure. Carries field-level detail; the
    /// submission performed no writes.
    #[error("validation failed: {}", format_fields(.errors))]
    Validation { errors: Vec<FieldError> },

    /// Project credential missing, malformed, or unknown.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// Uniqueness constraint hit. The record named already exists; callers
    /// on the ingestion path treat this as an idempotent success.
    #[error("duplicate {kind}: {key}")]
    Duplicate { kind: &'static str, key: String },

    /// Another scoring pass currently holds the lease for this lead.
    #[error("lease held for lead {0}")]
    LeaseHeld(uuid::Uuid),

    /// Store or queue temporarily unavailable. Retryable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Referenced record does not exist.
    #[error("not found: {kind} {key}")]
    NotFound { kind: &'static str, key: String },

    /// A dead-letter job was already retried once.
    #[error("job {0} already retried")]
    AlreadyRetried(uuid::Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

fn format_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a validation error from field-level failures.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Create a single-field validation error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn duplicate(kind: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            key: key.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the failed operation may succeed. Every worker error
    /// consumes a delivery attempt either way; this only classifies the
    /// failure for callers and logs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::LeaseHeld(_))
    }

    /// Whether this error is really an idempotent success.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

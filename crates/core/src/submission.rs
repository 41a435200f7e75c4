//! Inbound submission payload and its validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::FieldError;
use crate::limits::{MAX_PROPERTIES_BYTES, MAX_PROPERTY_DEPTH, MAX_PROPERTY_KEYS};

/// A candidate event as submitted by a client.
///
/// This is the untrusted shape: everything here is validated before any
/// write happens. `event_id` is optional; the gateway generates one when the
/// client does not supply its own idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EventSubmission {
    /// Project API key (`lsk_live_...` / `lsk_test_...`).
    #[validate(length(min = 1, message = "is required"))]
    pub api_key: String,
    /// Event type tag.
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub event_type: String,
    /// Stable anonymous identity of the subject.
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub anonymous_id: String,
    /// Optional resolved email for the subject.
    #[validate(email(message = "must be a valid email"))]
    #[validate(length(max = 320, message = "must be at most 320 characters"))]
    pub email: Option<String>,
    /// Optional session correlation ID.
    #[validate(length(max = 128, message = "must be at most 128 characters"))]
    pub session_id: Option<String>,
    /// Optional client-supplied event ID (idempotency key).
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub event_id: Option<String>,
    /// Free-form properties (bounded).
    #[validate(custom(function = "validate_properties"))]
    pub properties: Option<serde_json::Value>,
    /// Client-reported event time; defaults to receive time.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Outcome of a submission, as seen by the caller.
///
/// `Duplicate` is a success: the event was already durably accepted by an
/// earlier submission carrying the same event ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Accepted { event_id: String, lead_id: Uuid },
    Duplicate { event_id: String, lead_id: Uuid },
}

impl SubmissionOutcome {
    pub fn event_id(&self) -> &str {
        match self {
            Self::Accepted { event_id, .. } | Self::Duplicate { event_id, .. } => event_id,
        }
    }

    pub fn lead_id(&self) -> Uuid {
        match self {
            Self::Accepted { lead_id, .. } | Self::Duplicate { lead_id, .. } => *lead_id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Nesting depth of a JSON value. A scalar is depth 0, a flat map depth 1.
fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => {
            1 + map.values().map(json_depth).max().unwrap_or(0)
        }
        serde_json::Value::Array(items) => {
            1 + items.iter().map(json_depth).max().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Validates the property map against the byte/key-count/depth caps.
fn validate_properties(props: &serde_json::Value) -> Result<(), ValidationError> {
    if props.is_null() {
        return Ok(());
    }

    let map = match props.as_object() {
        Some(map) => map,
        None => {
            let mut err = ValidationError::new("properties_not_object");
            err.message = Some("must be a JSON object".into());
            return Err(err);
        }
    };

    if map.len() > MAX_PROPERTY_KEYS {
        let mut err = ValidationError::new("properties_too_many_keys");
        err.message =
            Some(format!("{} keys exceeds {} key limit", map.len(), MAX_PROPERTY_KEYS).into());
        return Err(err);
    }

    let depth = json_depth(props);
    if depth > MAX_PROPERTY_DEPTH {
        let mut err = ValidationError::new("properties_too_deep");
        err.message =
            Some(format!("nesting depth {depth} exceeds {MAX_PROPERTY_DEPTH} limit").into());
        return Err(err);
    }

    let size = serde_json::to_vec(props).map(|v| v.len()).unwrap_or(0);
    if size > MAX_PROPERTIES_BYTES {
        let mut err = ValidationError::new("properties_too_large");
        err.message = Some(
            format!(
                "properties {}KB exceeds {}KB limit",
                size / 1024,
                MAX_PROPERTIES_BYTES / 1024
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Flatten `validator` output into field-level errors for the caller.
pub fn collect_field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    for (field, kinds) in errors.field_errors() {
        for err in kinds {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("failed {} check", err.code));
            out.push(FieldError::new(field.to_string(), message));
        }
    }
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

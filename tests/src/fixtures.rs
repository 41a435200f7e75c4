//! Test fixtures and submission builders.

use scoring_core::EventSubmission;
use uuid::Uuid;

/// The project API key registered by the test context.
pub fn test_api_key() -> String {
    "lsk_test_ABC123xyz789DEF456ghi012JKL345mn".to_string()
}

/// A well-formed key that no project is registered under.
pub fn unknown_api_key() -> String {
    "lsk_live_ZZZ999zzz999ZZZ999zzz999ZZZ999zz".to_string()
}

/// A valid submission with a fresh client event ID.
pub fn submission(anonymous_id: &str, event_type: &str) -> EventSubmission {
    EventSubmission {
        api_key: test_api_key(),
        event_type: event_type.to_string(),
        anonymous_id: anonymous_id.to_string(),
        email: None,
        session_id: None,
        event_id: Some(Uuid::new_v4().to_string()),
        properties: None,
        occurred_at: None,
    }
}

/// A valid submission carrying a specific idempotency key.
pub fn submission_with_id(anonymous_id: &str, event_type: &str, event_id: &str) -> EventSubmission {
    EventSubmission {
        event_id: Some(event_id.to_string()),
        ..submission(anonymous_id, event_type)
    }
}

/// A submission with a resolved email identity.
pub fn submission_with_email(anonymous_id: &str, event_type: &str, email: &str) -> EventSubmission {
    EventSubmission {
        email: Some(email.to_string()),
        ..submission(anonymous_id, event_type)
    }
}

/// A property map exceeding the byte cap.
pub fn oversized_properties() -> serde_json::Value {
    serde_json::json!({ "blob": "x".repeat(20_000) })
}

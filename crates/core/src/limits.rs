//! Size limits and scoring constants for the pipeline.
//!
//! Payload limits prevent memory exhaustion from oversized property maps.
//! Scoring constants are design-level and data-independent: changing them
//! changes the meaning of persisted scores, so a project-wide rebuild is
//! required after any edit here.
//!
//! # Usage Note
//!
//! The `#[validate]` derive macro requires literal values in attributes, so
//! string-length limits are duplicated there. Keep both in sync when
//! modifying.

// === Property Map Limits ===

/// Maximum serialized property payload size in bytes (16KB).
///
/// Most real-world events carry well under 1KB of properties.
pub const MAX_PROPERTIES_BYTES: usize = 16 * 1024;

/// Maximum number of top-level property keys.
pub const MAX_PROPERTY_KEYS: usize = 64;

/// Maximum nesting depth of the property map.
///
/// Depth 1 is a flat map; 4 allows modest structure without letting clients
/// submit pathological recursion.
pub const MAX_PROPERTY_DEPTH: usize = 4;

// === String Field Limits (chars) ===

/// Event type tag max length.
pub const MAX_EVENT_TYPE_LEN: usize = 100;

/// Client-supplied event ID max length.
/// UUIDs=36, custom IDs up to 128.
pub const MAX_EVENT_ID_LEN: usize = 128;

/// Anonymous visitor ID max length.
pub const MAX_ANONYMOUS_ID_LEN: usize = 128;

/// Email max length (RFC 5321 path limit is 256; 320 covers display forms).
pub const MAX_EMAIL_LEN: usize = 320;

/// Session ID max length.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Rule label max length.
pub const MAX_RULE_LABEL_LEN: usize = 200;

// === API Key Format ===

/// Project API key pattern: `lsk_(live|test)_` + 32 alphanumerics.
pub const API_KEY_PATTERN: &str = r"^lsk_(live|test)_[a-zA-Z0-9]{32}$";

// === Scoring Constants ===

/// Score floor after clamping.
pub const SCORE_FLOOR: i32 = 0;

/// Score ceiling after clamping.
pub const SCORE_CEILING: i32 = 100;

/// Qualified stage threshold (score >= 60).
pub const STAGE_QUALIFIED_MIN: i32 = 60;

/// Hot stage threshold (score >= 31).
pub const STAGE_HOT_MIN: i32 = 31;

/// Warm stage threshold (score >= 11).
pub const STAGE_WARM_MIN: i32 = 11;

/// Velocity window in hours (rolling recent-event count).
pub const VELOCITY_WINDOW_HOURS: i64 = 24;

/// Velocity weighting applied to the rolling event count.
pub const VELOCITY_WEIGHT: f64 = 1.5;

// === Timing ===

/// Per-lead processing lease TTL in seconds.
///
/// Long enough for a worst-case apply loop, short enough that a crashed
/// worker's lead is picked up again quickly.
pub const LEASE_TTL_SECS: u64 = 60;

/// Staleness threshold for a lead stuck with a processing marker (seconds).
/// Past this the invariant checker flags the lead and the reconciler clears it.
pub const STALE_PROCESSING_SECS: i64 = 600;

/// Maximum delivery attempts before a job is dead-lettered.
pub const MAX_JOB_ATTEMPTS: u32 = 5;

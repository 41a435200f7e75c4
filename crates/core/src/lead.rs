//! Lead aggregate: the mutable, re-derivable scoring state per visitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::limits::{
    SCORE_CEILING, SCORE_FLOOR, STAGE_HOT_MIN, STAGE_QUALIFIED_MIN, STAGE_WARM_MIN,
    VELOCITY_WEIGHT,
};

/// Lifecycle stage, derived from score by fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Cold,
    Warm,
    Hot,
    Qualified,
}

impl Stage {
    /// Derive the stage for a score.
    pub fn for_score(score: i32) -> Self {
        if score >= STAGE_QUALIFIED_MIN {
            Self::Qualified
        } else if score >= STAGE_HOT_MIN {
            Self::Hot
        } else if score >= STAGE_WARM_MIN {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
            Self::Qualified => "qualified",
        }
    }
}

/// External identity a lead is resolved by.
///
/// `anonymous_id` is the stable upsert key within a project; an email seen
/// later on the same anonymous identity is merged onto the existing lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadIdentity {
    pub anonymous_id: String,
    pub email: Option<String>,
}

impl LeadIdentity {
    pub fn anonymous(anonymous_id: impl Into<String>) -> Self {
        Self {
            anonymous_id: anonymous_id.into(),
            email: None,
        }
    }

    pub fn with_email(anonymous_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            anonymous_id: anonymous_id.into(),
            email: Some(email.into()),
        }
    }
}

/// The mutable lead aggregate.
///
/// `score` is a materialization: it must always equal the `new_score` of the
/// most recent history entry, and the whole record is re-derivable from the
/// event log plus the rule store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub project_id: Uuid,
    pub anonymous_id: String,
    pub email: Option<String>,
    /// Current engagement score, clamped to `SCORE_FLOOR..=SCORE_CEILING`.
    pub score: i32,
    pub stage: Stage,
    /// Event count inside the rolling velocity window.
    pub events_last_24h: u32,
    /// Weighted velocity metric.
    pub velocity: f64,
    /// Soft mutual-exclusion marker set while a scoring pass owns this lead.
    pub processing_since: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a zeroed aggregate for a first-touch identity.
    pub fn new(project_id: Uuid, identity: LeadIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            anonymous_id: identity.anonymous_id,
            email: identity.email,
            score: 0,
            stage: Stage::Cold,
            events_last_24h: 0,
            velocity: 0.0,
            processing_since: None,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset derived state to zero, preserving identity. Used by rebuild.
    pub fn reset_derived(&mut self) {
        self.score = 0;
        self.stage = Stage::Cold;
        self.events_last_24h = 0;
        self.velocity = 0.0;
        self.processing_since = None;
        self.last_event_at = None;
        self.updated_at = Utc::now();
    }

    /// Apply a score transition, re-deriving stage.
    pub fn apply_score(&mut self, new_score: i32, event_at: DateTime<Utc>) {
        self.score = new_score;
        self.stage = Stage::for_score(new_score);
        self.last_event_at = Some(event_at);
        self.updated_at = Utc::now();
    }

    /// Recompute the velocity metric from a fresh rolling event count.
    pub fn update_velocity(&mut self, events_last_24h: u32) {
        self.events_last_24h = events_last_24h;
        self.velocity = f64::from(events_last_24h) * VELOCITY_WEIGHT;
    }
}

/// Clamp a raw score into the allowed band.
pub fn clamp_score(score: i64) -> i32 {
    score.clamp(i64::from(SCORE_FLOOR), i64::from(SCORE_CEILING)) as i32
}

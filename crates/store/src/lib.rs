//! Storage seams and the in-memory backend for the lead scoring engine.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{
    CommitOutcome, EventStore, FailedJobStore, HistoryStore, InsertOutcome, LeadStore, LeaseStore,
    RuleStore, ScoreCommitStore, SharedStorage, Storage,
};

//! Consistency and repair: invariant checking, rebuild, dead-letter triage.

pub mod checker;
pub mod dead_letter;
pub mod rebuild;

pub use checker::{Finding, Invariant, InvariantChecker, InvariantReport, Severity, MAX_SAMPLE};
pub use dead_letter::DeadLetterManager;
pub use rebuild::{RebuildService, RebuildSummary};

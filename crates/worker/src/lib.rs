//! Scoring worker and background maintenance tasks.

pub mod scheduler;
pub mod scoring;

pub use scheduler::{WorkerConfig, WorkerScheduler};
pub use scoring::{ScoringWorker, StoreDeadLetterSink};

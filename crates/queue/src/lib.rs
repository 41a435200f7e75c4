//! Keyed at-least-once job queue with backoff retry and dead-lettering.

pub mod config;
pub mod queue;

pub use config::QueueConfig;
pub use queue::{DeadLetterSink, EnqueueOutcome, JobHandler, JobQueue};

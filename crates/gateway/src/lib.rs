//! Intake gateway: validation, authentication, dedup, and enqueue.

pub mod intake;
pub mod keyring;

pub use intake::IntakeGateway;
pub use keyring::ProjectKeyring;

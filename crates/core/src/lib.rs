//! Holdwatch Core - domain entities, collection orchestration and traits.
//!
//! This crate owns the work-unit state machine and the collection pipeline.
//! It is database-agnostic: checkpoint, holdings and investor persistence
//! are traits implemented by the `storage-sqlite` crate.

pub mod alerts;
pub mod checkpoints;
pub mod collector;
pub mod errors;
pub mod holdings;
pub mod investors;

pub use checkpoints::{Checkpoint, CheckpointStatus, WorkUnitKey};
pub use collector::{CollectionOrchestrator, CollectorConfig, CycleReport};
pub use holdings::{Holding, HoldingSnapshot};
pub use investors::InvestorProfile;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

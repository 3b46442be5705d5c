//! Collector module - cycle orchestration over checkpointed work units.

mod collector_model;
mod orchestrator;

pub use collector_model::{CollectorConfig, CollectorStatus, CycleReport, UnitOutcome, UnitResult};
pub use orchestrator::CollectionOrchestrator;

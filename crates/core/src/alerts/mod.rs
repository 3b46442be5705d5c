//! Collector alerts.
//!
//! The orchestrator raises alerts for conditions that need an operator:
//! escalating parse failures, exhausted retries and reclaimed stale units.
//! The server wires a sink that writes them to the structured log.

mod alert;
mod sink;

pub use alert::*;
pub use sink::*;

//! Checkpoints module - per-unit progress records and their state machine.

mod checkpoints_model;
mod checkpoints_traits;

pub use checkpoints_model::{
    Checkpoint, CheckpointFilter, CheckpointOperation, CheckpointStatus, FailureKind, WorkUnitKey,
};
pub use checkpoints_traits::CheckpointStore;

//! SQLite storage for collector checkpoints.

mod model;
mod repository;

pub use model::CheckpointDB;
pub use repository::CheckpointRepository;

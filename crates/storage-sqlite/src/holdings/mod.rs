//! SQLite storage for collected holdings.

mod model;
mod repository;

pub use model::HoldingDB;
pub use repository::HoldingsRepository;

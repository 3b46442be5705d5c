//! SQLite storage implementation for Holdwatch.
//!
//! Implements the store traits defined in `holdwatch-core` with Diesel on
//! SQLite:
//! - connection pooling and embedded migrations
//! - the single writer actor every mutation goes through
//! - repositories for checkpoints, holdings and the investor roster
//!
//! ```text
//! holdwatch-core (traits)
//!          │
//!          ▼
//! storage-sqlite (this crate)
//!          │
//!          ▼
//!      SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

pub mod checkpoints;
pub mod holdings;
pub mod investors;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

pub use errors::{IntoCore, StorageError};

pub use checkpoints::CheckpointRepository;
pub use holdings::HoldingsRepository;
pub use investors::InvestorRepository;

pub use holdwatch_core::errors::{DatabaseError, Error, Result};

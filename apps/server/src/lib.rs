//! Holdwatch server: configuration, tracing, the collection scheduler and
//! the admin HTTP API.

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod main_lib;
pub mod scheduler;

pub use main_lib::{build_state, init_tracing, AppState};

//! SQLite storage for the investor roster.

mod model;
mod repository;

pub use model::InvestorProfileDB;
pub use repository::InvestorRepository;

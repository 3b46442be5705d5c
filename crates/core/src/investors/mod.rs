//! Investors module - the roster of tracked filing managers.

mod investors_model;
mod investors_traits;

pub use investors_model::InvestorProfile;
pub use investors_traits::InvestorDirectory;

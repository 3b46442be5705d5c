//! Core types shared by sources, parsers and resolvers.

mod document;
mod holding;
mod period;

pub use document::{
    DocumentFormat, DocumentMetadata, FilingDocument, FilingRequest, ValueUnit,
    DOLLAR_VALUES_EFFECTIVE,
};
pub use holding::ParsedHolding;
pub use period::{FilingPeriod, InvalidPeriod};

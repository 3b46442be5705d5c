//! Core error types for Holdwatch.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::ParseError as ChronoParseError;
use thiserror::Error;

use holdwatch_filings::{FetchError, InvalidPeriod, ParseError};

use crate::checkpoints::{CheckpointOperation, CheckpointStatus, WorkUnitKey};

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Filing fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Filing parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Investor not found: {0}")]
    InvestorNotFound(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Missing configuration key: {0}")]
    MissingConfigKey(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// A checkpoint operation was rejected.
///
/// These are expected outcomes of racing workers and retry accounting, not
/// infrastructure failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("No checkpoint for {0}")]
    NotFound(WorkUnitKey),

    #[error("{0} is already in progress")]
    AlreadyInProgress(WorkUnitKey),

    #[error("{0} has already been collected")]
    AlreadyDone(WorkUnitKey),

    #[error("{key} exhausted its retries ({retry_count}/{max_retries}); reset required")]
    RetryExhausted {
        key: WorkUnitKey,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("Cannot {operation} a {from} checkpoint")]
    InvalidTransition {
        from: CheckpointStatus,
        operation: CheckpointOperation,
    },
}

/// A snapshot could not be reconciled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Total market value is zero across {0} holdings")]
    ZeroTotal(usize),

    #[error("Holding from '{0}' has no ticker or CUSIP")]
    MissingIdentifier(String),
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),

    #[error(transparent)]
    Period(#[from] InvalidPeriod),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<InvalidPeriod> for Error {
    fn from(err: InvalidPeriod) -> Self {
        Error::Validation(ValidationError::Period(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

impl Error {
    /// The checkpoint rejection wrapped by this error, if any.
    pub fn as_checkpoint(&self) -> Option<&CheckpointError> {
        match self {
            Error::Checkpoint(e) => Some(e),
            _ => None,
        }
    }
}

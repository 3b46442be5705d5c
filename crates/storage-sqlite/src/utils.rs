//! Column encoding helpers shared by the repositories.
//!
//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision
//! and a `Z` suffix. That form sorts lexicographically in time order, which
//! lets SQL compare timestamps as plain text.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StorageError;

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(column, value, e))
}

pub fn parse_optional_timestamp(
    column: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    value.map(|v| parse_timestamp(column, v)).transpose()
}

pub fn parse_date(column: &str, value: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| StorageError::corrupt(column, value, e))
}

pub fn parse_decimal(column: &str, value: &str) -> Result<Decimal, StorageError> {
    value
        .parse::<Decimal>()
        .map_err(|e| StorageError::corrupt(column, value, e))
}

/// Stores a unit-variant enum as its bare serde name, e.g. `IN_PROGRESS`.
pub fn enum_to_db<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value)
        .map(|s| s.trim_matches('"').to_string())
        .map_err(|e| StorageError::SerializationError(e.to_string()))
}

pub fn enum_from_db<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, StorageError> {
    serde_json::from_str(&format!("\"{}\"", value))
        .map_err(|e| StorageError::corrupt(column, value, e))
}

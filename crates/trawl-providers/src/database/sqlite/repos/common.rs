//! Shared helpers for the SQLite repositories.

use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{SqlParam, SqlRow};
use trawl_domain::utils::time;

/// Current epoch seconds.
pub(crate) fn now() -> i64 {
    time::epoch_secs()
}

/// `?, ?, …` for an `IN` clause of `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n.max(1)].join(", ")
}

/// String params for an `IN` clause.
pub(crate) fn string_params(values: &[String]) -> Vec<SqlParam> {
    values.iter().cloned().map(SqlParam::String).collect()
}

/// Required string column.
pub(crate) fn req_string(row: &dyn SqlRow, name: &str) -> Result<String> {
    row.try_get_string(name)?
        .ok_or_else(|| Error::database(format!("missing column '{name}'")))
}

/// Required i64 column.
pub(crate) fn req_i64(row: &dyn SqlRow, name: &str) -> Result<i64> {
    row.try_get_i64(name)?
        .ok_or_else(|| Error::database(format!("missing column '{name}'")))
}

/// Required bool column.
pub(crate) fn req_bool(row: &dyn SqlRow, name: &str) -> Result<bool> {
    row.try_get_bool(name)?
        .ok_or_else(|| Error::database(format!("missing column '{name}'")))
}

/// Decode a JSON string-array column (owner lists).
pub(crate) fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encode a string list for a JSON column.
pub(crate) fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_owned())
}

/// Parse a stored enum rendered through `Display`/serde snake_case.
pub(crate) fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|e| Error::database_with_source(format!("undecodable {what} '{raw}'"), e))
}

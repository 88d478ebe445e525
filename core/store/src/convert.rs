//! Logical-type coercion for externally sourced values.

use rusqlite::types::Value as SqlValue;
use serde_json::Value as Json;

use lenda_common::{Error, Result};

use crate::schema::{ColumnType, TableSpec};

fn type_error(table: &str, column: &str, value: &Json) -> Error {
    Error::Type {
        table: table.to_string(),
        column: column.to_string(),
        value: value.to_string(),
    }
}

/// Convert a raw API value into the SQL value declared for `table.column`.
///
/// Null passes through unconditionally: absence of data is representable
/// regardless of the declared type.
pub fn convert_value(
    spec: &TableSpec,
    table: &str,
    column: &str,
    value: &Json,
) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let column_type = spec
        .column_type(column)
        .ok_or_else(|| type_error(table, column, value))?;

    match column_type {
        ColumnType::Text => Ok(SqlValue::Text(to_text(value))),
        ColumnType::Int => to_int(value)
            .map(SqlValue::Integer)
            .ok_or_else(|| type_error(table, column, value)),
        ColumnType::Real => to_real(value)
            .map(SqlValue::Real)
            .ok_or_else(|| type_error(table, column, value)),
        ColumnType::Bool => to_bool(value)
            .map(SqlValue::Integer)
            .ok_or_else(|| type_error(table, column, value)),
        // Timestamps are persisted as-is; callers normalize upstream.
        ColumnType::Datetime => match value {
            Json::String(s) => Ok(SqlValue::Text(s.clone())),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| type_error(table, column, value)),
            },
            _ => Err(type_error(table, column, value)),
        },
    }
}

/// Stringify any value; structured payloads (the notification `link`)
/// become compact JSON text.
fn to_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn to_int(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n
            .as_i64()
            // Integral coercion truncates, matching the source system.
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Json::Bool(b) => Some(i64::from(*b)),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_real(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::Bool(b) => Some(f64::from(u8::from(*b))),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalize booleans to 0/1. Accepts JSON booleans, case-insensitive
/// "true"/"false" strings and the integers 0/1; everything else is rejected.
fn to_bool(value: &Json) -> Option<i64> {
    match value {
        Json::Bool(b) => Some(i64::from(*b)),
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(1),
            "false" | "0" => Some(0),
            _ => None,
        },
        Json::Number(n) => match n.as_i64() {
            Some(0) => Some(0),
            Some(1) => Some(1),
            _ => None,
        },
        _ => None,
    }
}

//! Shared data types.

/// A row as exchanged with the remote API and the local store: column name
/// to raw JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

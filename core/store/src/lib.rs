//! Schema-driven persistence layer for Lenda.
//!
//! This module provides:
//! - A declarative table registry loaded from a YAML descriptor
//! - Logical-type value coercion for externally sourced records
//! - Idempotent table creation and replace-on-write upserts
//! - A schema-version guard over the internal bookkeeping table
//! - Typed read-only entity models for reporting

pub mod convert;
pub mod models;
pub mod records;
pub mod schema;
pub mod tables;
pub mod version;

pub use convert::convert_value;
pub use records::{Record, Store};
pub use schema::{ColumnType, PrimaryKey, SchemaRegistry, TableSpec};
pub use version::{ensure_version, SCHEMA_VERSION};

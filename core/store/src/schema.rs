//! Declarative table registry loaded from a YAML descriptor.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use lenda_common::{Error, Result};

/// The descriptor shipped with the crate, covering every table the sync
/// engine writes.
const DEFAULT_DESCRIPTOR: &str = include_str!("../data/tables.yaml");

/// Logical column type in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Int,
    Real,
    Bool,
    Datetime,
}

impl ColumnType {
    /// SQL type this logical type lowers to. Booleans are stored as a
    /// narrow integer.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INT",
            ColumnType::Real => "REAL",
            ColumnType::Bool => "INT",
            ColumnType::Datetime => "DATETIME",
        }
    }
}

/// Storage order of the primary key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrder {
    Asc,
    Desc,
}

impl KeyOrder {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            KeyOrder::Asc => "ASC",
            KeyOrder::Desc => "DESC",
        }
    }
}

/// Primary key descriptor of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Column carrying the key.
    pub name: String,
    /// Storage order.
    pub order: KeyOrder,
    /// Whether the key is assigned by the store rather than the remote.
    pub autoincrement: bool,
}

/// One table in the descriptor: ordered columns plus the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub primary_key: PrimaryKey,
    pub columns: IndexMap<String, ColumnType>,
}

impl TableSpec {
    /// Look up the logical type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).copied()
    }

    /// Whether the descriptor declares this column.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }
}

/// Registry of every declared table.
///
/// Loaded once at startup and passed by reference to the store handle;
/// immutable after load.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: IndexMap<String, TableSpec>,
}

impl SchemaRegistry {
    /// Parse a YAML descriptor.
    ///
    /// # Errors
    /// - Malformed YAML or an unknown logical type
    /// - A table whose primary key names an undeclared column
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let tables: IndexMap<String, TableSpec> = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("malformed schema descriptor: {}", e)))?;

        if tables.is_empty() {
            return Err(Error::Config("schema descriptor declares no tables".to_string()));
        }

        for (name, spec) in &tables {
            if !spec.has_column(&spec.primary_key.name) {
                return Err(Error::Config(format!(
                    "table '{}' declares primary key '{}' which is not a column",
                    name, spec.primary_key.name
                )));
            }
        }

        Ok(Self { tables })
    }

    /// Load a descriptor from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read schema descriptor '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&raw)
    }

    /// The descriptor compiled into the crate.
    pub fn builtin() -> Self {
        Self::from_yaml(DEFAULT_DESCRIPTOR).expect("built-in schema descriptor is valid")
    }

    /// Look up a table, failing with a configuration error when undeclared.
    pub fn table(&self, name: &str) -> Result<&TableSpec> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::Config(format!("table '{}' is not in the schema", name)))
    }

    /// Iterate all declared tables in descriptor order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableSpec)> {
        self.tables.iter().map(|(name, spec)| (name.as_str(), spec))
    }
}

//! Table creation derived from the schema registry.

use rusqlite::Connection;
use tracing::debug;

use lenda_common::{Error, Result};

use crate::schema::{SchemaRegistry, TableSpec};

/// Render the `CREATE TABLE IF NOT EXISTS` statement for one table.
///
/// The primary key column is rendered as `INTEGER PRIMARY KEY` with its
/// declared order and autoincrement flag; boolean columns lower to INT.
pub fn create_sql(name: &str, spec: &TableSpec) -> String {
    let mut items = Vec::with_capacity(spec.columns.len());

    for (column, column_type) in &spec.columns {
        let is_pk = *column == spec.primary_key.name;
        if is_pk {
            let auto = if spec.primary_key.autoincrement {
                " AUTOINCREMENT"
            } else {
                ""
            };
            items.push(format!(
                "{} INTEGER PRIMARY KEY {}{}",
                column,
                spec.primary_key.order.sql_keyword(),
                auto
            ));
        } else {
            items.push(format!("{} {}", column, column_type.sql_type()));
        }
    }

    format!("CREATE TABLE IF NOT EXISTS {} (\n\t{}\n)", name, items.join(",\n\t"))
}

/// Create every declared table that does not exist yet.
///
/// Safe to call on every process start. Existing tables are never altered;
/// a stale layout is caught by the version guard, not here.
pub fn ensure_schema(conn: &Connection, registry: &SchemaRegistry) -> Result<()> {
    for (name, spec) in registry.tables() {
        let sql = create_sql(name, spec);
        debug!(table = name, "ensuring table");
        conn.execute(&sql, [])
            .map_err(|e| Error::Storage(format!("creating table '{}': {}", name, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_create_sql_shape() {
        let registry = SchemaRegistry::builtin();
        let sql = create_sql("a_loans", registry.table("a_loans").unwrap());

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS a_loans"));
        assert!(sql.contains("id INTEGER PRIMARY KEY ASC"));
        // bool lowers to INT
        assert!(sql.contains("topped INT"));
        assert!(sql.contains("datePublished DATETIME"));
        assert!(!sql.contains("AUTOINCREMENT"));
    }

    #[test]
    fn test_autoincrement_rendered_for_internal_table() {
        let registry = SchemaRegistry::builtin();
        let sql = create_sql("z_internals", registry.table("z_internals").unwrap());
        assert!(sql.contains("id INTEGER PRIMARY KEY ASC AUTOINCREMENT"));
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let registry = SchemaRegistry::builtin();
        let conn = Connection::open_in_memory().unwrap();

        ensure_schema(&conn, &registry).unwrap();
        // Second run must not fail on existing tables.
        ensure_schema(&conn, &registry).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'a_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 7);
    }
}

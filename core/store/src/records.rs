//! Generic record storage over the declared tables.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value as Json};
use tracing::{debug, info, warn};

use lenda_common::{Error, Result};
pub use lenda_common::Record;

use crate::convert::convert_value;
use crate::schema::SchemaRegistry;
use crate::tables::ensure_schema;

fn storage_err(context: &str, e: rusqlite::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

/// Handle over the local store file.
///
/// Wraps the connection together with the schema registry; constructed once
/// at startup and passed by reference to the sync engine and reporting code.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    registry: SchemaRegistry,
    path: String,
}

impl Store {
    /// Open (or create) a store file and ensure all declared tables exist.
    pub fn open(path: impl AsRef<std::path::Path>, registry: SchemaRegistry) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| storage_err(&format!("opening store '{}'", path.display()), e))?;
        ensure_schema(&conn, &registry)?;
        info!(store = %path.display(), "store opened");
        Ok(Self {
            conn,
            registry,
            path: path.display().to_string(),
        })
    }

    /// Open an existing store, failing when the file is absent.
    ///
    /// Used by everything except initialization so that a missing store is an
    /// explicit "run init first" condition instead of a silently created
    /// empty database.
    pub fn open_existing(
        path: impl AsRef<std::path::Path>,
        registry: SchemaRegistry,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotInitialized(path.display().to_string()));
        }
        Self::open(path, registry)
    }

    /// In-memory store (for testing).
    pub fn in_memory(registry: SchemaRegistry) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| storage_err("opening in-memory store", e))?;
        ensure_schema(&conn, &registry)?;
        Ok(Self {
            conn,
            registry,
            path: ":memory:".to_string(),
        })
    }

    /// Location of the store file, for diagnostics.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The schema registry this store was opened with.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert-or-replace a batch of records keyed by the table's primary key.
    ///
    /// Keys not declared in the schema are dropped with a warning so that new
    /// API fields never leak into the store. All rows of one call are written
    /// in a single transaction.
    ///
    /// The column set of the statement is derived from the last record in the
    /// sequence; callers must pass homogeneous batches. The behavior with
    /// mixed batches is pinned by a test.
    pub fn upsert(&self, table: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let spec = self.registry.table(table)?;

        let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(records.len());
        let mut columns: Vec<&str> = Vec::new();

        for record in records {
            let mut cols = Vec::with_capacity(record.len());
            let mut row = Vec::with_capacity(record.len());

            for (key, value) in record {
                if !spec.has_column(key) {
                    warn!(
                        table,
                        column = %key,
                        value = %value,
                        "field present in API response but not in schema, dropping"
                    );
                    continue;
                }
                cols.push(key.as_str());
                row.push(convert_value(spec, table, key, value)?);
            }

            rows.push(row);
            columns = cols;
        }

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        debug!(table, rows = rows.len(), "upserting batch");

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| storage_err("starting transaction", e))?;
        {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| storage_err(&format!("preparing upsert into '{}'", table), e))?;
            for row in rows {
                stmt.execute(params_from_iter(row))
                    .map_err(|e| storage_err(&format!("upserting into '{}'", table), e))?;
            }
        }
        tx.commit()
            .map_err(|e| storage_err("committing upsert", e))
    }

    /// Fetch the single row with the given primary key.
    pub fn get_one(&self, table: &str, id: i64) -> Result<Option<Record>> {
        let spec = self.registry.table(table)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1",
            table, spec.primary_key.name
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| storage_err(&format!("querying '{}'", table), e))?;
        let mut rows = stmt
            .query([id])
            .map_err(|e| storage_err(&format!("querying '{}'", table), e))?;

        match rows.next().map_err(|e| storage_err("reading row", e))? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    /// Fetch all rows, or only those whose primary key is in `ids`.
    pub fn get_all(&self, table: &str, ids: Option<&[i64]>) -> Result<Vec<Record>> {
        let spec = self.registry.table(table)?;

        let sql = match ids {
            Some(ids) => {
                let id_list = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT * FROM {} WHERE {} IN ({})",
                    table, spec.primary_key.name, id_list
                )
            }
            None => format!("SELECT * FROM {}", table),
        };

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| storage_err(&format!("querying '{}'", table), e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| storage_err(&format!("querying '{}'", table), e))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|e| storage_err("reading row", e))? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    /// Delete every row of a volatile table before a fresh snapshot write.
    pub fn clear_table(&self, table: &str) -> Result<()> {
        self.registry.table(table)?;
        debug!(table, "clearing table");
        self.conn
            .execute(&format!("DELETE FROM {}", table), [])
            .map_err(|e| storage_err(&format!("clearing '{}'", table), e))?;
        Ok(())
    }

    /// Append a timestamped sync-event row to the internal table.
    pub fn mark_sync_event(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.conn
            .execute(
                "INSERT INTO z_internals (updated) VALUES (?1)",
                [now.as_str()],
            )
            .map_err(|e| storage_err("marking sync event", e))?;
        Ok(())
    }

    /// Timestamp of the most recent sync event, if any.
    pub fn last_sync_timestamp(&self) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT MAX(updated) FROM z_internals", [], |row| row.get(0))
            .map_err(|e| storage_err("reading last sync timestamp", e))
    }

    /// Watermark bounding the incremental transaction fetch: the newest
    /// transaction timestamp already persisted.
    pub fn last_transaction_timestamp(&self) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT MAX(transactionDate) FROM a_transactions",
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("reading transaction watermark", e))
    }

    /// Loan ids referenced by stored transactions that have no loan row yet.
    pub fn missing_loan_ids(&self) -> Result<Vec<i64>> {
        let sql = "
            SELECT DISTINCT a_transactions.loanId
            FROM a_transactions
            LEFT JOIN a_loans ON a_transactions.loanId = a_loans.id
            WHERE a_loans.id IS NULL
            AND a_transactions.loanId IS NOT NULL
            ORDER BY a_transactions.loanId";

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| storage_err("querying missing loans", e))?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| storage_err("querying missing loans", e))?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|e| storage_err("reading missing loans", e))?;
        Ok(ids)
    }

    /// Notifications with no relation row yet, as (id, link payload) pairs.
    pub fn unresolved_notifications(&self) -> Result<Vec<(i64, String)>> {
        let sql = "
            SELECT a_notifications.id, a_notifications.link
            FROM a_notifications
            LEFT JOIN z_notifications_relations
                ON a_notifications.id = z_notifications_relations.notificationId
            WHERE z_notifications_relations.notificationId IS NULL
            AND a_notifications.id IS NOT NULL
            GROUP BY a_notifications.id";

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| storage_err("querying unresolved notifications", e))?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default()))
            })
            .map_err(|e| storage_err("querying unresolved notifications", e))?
            .collect::<std::result::Result<Vec<(i64, String)>, _>>()
            .map_err(|e| storage_err("reading unresolved notifications", e))?;
        Ok(pairs)
    }
}

/// Map a SQL row back into a JSON record.
fn row_to_record(row: &rusqlite::Row<'_>) -> Result<Record> {
    let mut record = Record::new();

    for (idx, name) in row.as_ref().column_names().iter().enumerate() {
        let value = match row
            .get_ref(idx)
            .map_err(|e| storage_err("reading column", e))?
        {
            ValueRef::Null => Json::Null,
            ValueRef::Integer(i) => Json::Number(i.into()),
            ValueRef::Real(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
            ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Json::Null,
        };
        record.insert((*name).to_string(), value);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use serde_json::json;

    fn store() -> Store {
        Store::in_memory(SchemaRegistry::builtin()).unwrap()
    }

    fn record(value: Json) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = store();
        let loan = record(json!({
            "id": 42,
            "name": "Loan",
            "amount": 120000.0,
            "interestRate": 0.0549,
            "rating": "AA",
        }));

        store.upsert("a_loans", &[loan.clone()]).unwrap();
        store.upsert("a_loans", &[loan]).unwrap();

        let all = store.get_all("a_loans", None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["id"], json!(42));
        assert_eq!(all[0]["amount"], json!(120000.0));
    }

    #[test]
    fn test_upsert_replaces_by_primary_key() {
        let store = store();
        store
            .upsert("a_loans", &[record(json!({"id": 1, "rating": "A"}))])
            .unwrap();
        store
            .upsert("a_loans", &[record(json!({"id": 1, "rating": "B"}))])
            .unwrap();

        let loan = store.get_one("a_loans", 1).unwrap().unwrap();
        assert_eq!(loan["rating"], json!("B"));
    }

    #[test]
    fn test_upsert_whitelists_schema_columns() {
        let store = store();
        let wallet = record(json!({
            "id": 1,
            "availableBalance": 900.0,
            "surpriseField": "from a newer API",
        }));

        store.upsert("a_wallet", &[wallet]).unwrap();

        let stored = store.get_one("a_wallet", 1).unwrap().unwrap();
        assert_eq!(stored["availableBalance"], json!(900.0));
        assert!(!stored.contains_key("surpriseField"));
    }

    #[test]
    fn test_upsert_empty_batch_is_noop() {
        let store = store();
        store.upsert("a_loans", &[]).unwrap();
        assert!(store.get_all("a_loans", None).unwrap().is_empty());
    }

    // Pins the documented quirk: the statement's column set comes from the
    // last record of the batch. Earlier records with the same number of
    // fields but different names get their values bound to the wrong
    // columns. Callers pass homogeneous batches.
    #[test]
    fn test_upsert_column_set_comes_from_last_record() {
        let store = store();
        let first = record(json!({"id": 1, "rating": "A"}));
        let last = record(json!({"id": 2, "amount": 100.0}));

        store.upsert("a_loans", &[first, last]).unwrap();

        let one = store.get_one("a_loans", 1).unwrap().unwrap();
        // The first record's rating landed in the amount column.
        assert_eq!(one["rating"], Json::Null);
        assert_eq!(one["amount"], json!("A"));
    }

    // A batch whose records disagree on field count cannot even bind and
    // surfaces as a storage error.
    #[test]
    fn test_upsert_mismatched_arity_is_storage_error() {
        let store = store();
        let first = record(json!({"id": 1, "rating": "A", "amount": 100.0}));
        let last = record(json!({"id": 2, "rating": "B"}));

        let err = store.upsert("a_loans", &[first, last]).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_type_error_fails_whole_batch() {
        let store = store();
        let bad = record(json!({"id": 3, "topped": 2}));

        assert!(store.upsert("a_loans", &[bad]).is_err());
        assert!(store.get_one("a_loans", 3).unwrap().is_none());
    }

    #[test]
    fn test_get_all_with_id_filter() {
        let store = store();
        for id in 1..=3 {
            store
                .upsert("a_loans", &[record(json!({"id": id}))])
                .unwrap();
        }

        let subset = store.get_all("a_loans", Some(&[1, 3])).unwrap();
        assert_eq!(subset.len(), 2);
    }

    #[test]
    fn test_clear_table() {
        let store = store();
        store
            .upsert("a_wallet", &[record(json!({"id": 1, "balance": 1.0}))])
            .unwrap();
        store.clear_table("a_wallet").unwrap();
        assert!(store.get_all("a_wallet", None).unwrap().is_empty());
    }

    #[test]
    fn test_sync_event_advances_timestamp() {
        let store = store();
        assert!(store.last_sync_timestamp().unwrap().is_none());

        store.mark_sync_event().unwrap();
        assert!(store.last_sync_timestamp().unwrap().is_some());
    }

    #[test]
    fn test_missing_loan_ids_anti_join() {
        let store = store();
        for (id, loan_id) in [(1, 1), (2, 2), (3, 3)] {
            store
                .upsert(
                    "a_transactions",
                    &[record(json!({"id": id, "loanId": loan_id}))],
                )
                .unwrap();
        }
        store
            .upsert("a_loans", &[record(json!({"id": 2}))])
            .unwrap();

        assert_eq!(store.missing_loan_ids().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_missing_loan_ids_skips_null_loans() {
        let store = store();
        store
            .upsert(
                "a_transactions",
                &[record(json!({"id": 1, "loanId": null}))],
            )
            .unwrap();

        assert!(store.missing_loan_ids().unwrap().is_empty());
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lenda.db");

        let err = Store::open_existing(&path, SchemaRegistry::builtin()).unwrap_err();
        assert!(matches!(err, Error::NotInitialized(_)));

        Store::open(&path, SchemaRegistry::builtin()).unwrap();
        assert!(Store::open_existing(&path, SchemaRegistry::builtin()).is_ok());
    }
}

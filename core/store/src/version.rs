//! Schema-version marker in the internal bookkeeping table.

use tracing::info;

use lenda_common::{Error, Result};

use crate::records::Store;

/// Version of the table layout this build writes. Bump when the descriptor
/// changes shape; there is intentionally no migration path, a bumped version
/// requires the operator to discard the store and resynchronize.
pub const SCHEMA_VERSION: i64 = 3;

/// Stamp the version on first run, or fail when the store was written by a
/// different schema version.
///
/// The caller owns process termination; this only reports the mismatch.
pub fn ensure_version(store: &Store, expected: i64) -> Result<()> {
    let recorded: Option<i64> = store
        .conn()
        .query_row("SELECT MAX(db_version) FROM z_internals", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Storage(format!("reading schema version: {}", e)))?;

    match recorded {
        None => {
            store
                .conn()
                .execute("INSERT INTO z_internals (db_version) VALUES (?1)", [expected])
                .map_err(|e| Error::Storage(format!("stamping schema version: {}", e)))?;
            info!(version = expected, "stamped schema version");
            Ok(())
        }
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(Error::VersionMismatch {
            path: store.path().to_string(),
            found,
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn store() -> Store {
        Store::in_memory(SchemaRegistry::builtin()).unwrap()
    }

    #[test]
    fn test_first_run_stamps_version() {
        let store = store();
        ensure_version(&store, SCHEMA_VERSION).unwrap();

        let recorded: i64 = store
            .conn()
            .query_row("SELECT MAX(db_version) FROM z_internals", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(recorded, SCHEMA_VERSION);
    }

    #[test]
    fn test_matching_version_passes() {
        let store = store();
        ensure_version(&store, SCHEMA_VERSION).unwrap();
        ensure_version(&store, SCHEMA_VERSION).unwrap();
    }

    #[test]
    fn test_mismatch_is_fatal_and_mutation_free() {
        let store = store();
        ensure_version(&store, SCHEMA_VERSION + 1).unwrap();

        let err = ensure_version(&store, SCHEMA_VERSION).unwrap_err();
        match err {
            Error::VersionMismatch { found, expected, .. } => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected version mismatch, got {:?}", other),
        }

        // The failed check must not have written anything.
        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM z_internals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}

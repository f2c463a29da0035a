//! SQLite-backed record store

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::{Filter, FilterOp, Record, Result, StoreError};

/// The record store. One SQLite database holds all collections; each record
/// is a JSON blob plus an `updated_at` column used for conditional writes.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store in the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref();
        fs::create_dir_all(dir)?;
        let db_path = dir.join("records.db");
        let conn = Connection::open(&db_path)?;
        // Multiple processes may share the file; wait out short write locks
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection  TEXT NOT NULL,
                id          TEXT NOT NULL,
                data        TEXT NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS record_index (
                collection  TEXT NOT NULL,
                id          TEXT NOT NULL,
                field       TEXT NOT NULL,
                value       TEXT NOT NULL,
                PRIMARY KEY (collection, id, field)
            );
            CREATE INDEX IF NOT EXISTS idx_record_index_lookup
                ON record_index (collection, field, value);",
        )?;

        debug!(path = %db_path.display(), "Opened record store");
        Ok(Self { conn })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE records (
                collection TEXT NOT NULL, id TEXT NOT NULL, data TEXT NOT NULL,
                updated_at INTEGER NOT NULL, PRIMARY KEY (collection, id));
            CREATE TABLE record_index (
                collection TEXT NOT NULL, id TEXT NOT NULL, field TEXT NOT NULL,
                value TEXT NOT NULL, PRIMARY KEY (collection, id, field));
            CREATE INDEX idx_record_index_lookup
                ON record_index (collection, field, value);",
        )?;
        Ok(Self { conn })
    }

    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the id is
    /// already present - id collisions are a hard error, never silently merged.
    pub fn create<R: Record>(&mut self, record: R) -> Result<String> {
        let collection = R::collection_name();
        let id = record.id().to_string();
        let data = serde_json::to_string(&record)?;

        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![collection, id, data, record.updated_at()],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(format!("{}/{}", collection, id)));
        }
        write_indexes(&tx, collection, &id, &record)?;
        tx.commit()?;

        debug!(collection, %id, "Created record");
        Ok(id)
    }

    /// Get a record by id
    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![R::collection_name(), id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Update an existing record unconditionally
    pub fn update<R: Record>(&mut self, record: R) -> Result<()> {
        let collection = R::collection_name();
        let id = record.id().to_string();
        let data = serde_json::to_string(&record)?;

        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE records SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
            params![data, record.updated_at(), collection, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("{}/{}", collection, id)));
        }
        write_indexes(&tx, collection, &id, &record)?;
        tx.commit()?;

        debug!(collection, %id, "Updated record");
        Ok(())
    }

    /// Update a record only if its stored `updated_at` still matches
    /// `expected_updated_at`. Returns [`StoreError::Conflict`] when another
    /// writer got there first, leaving the stored record untouched.
    pub fn update_checked<R: Record>(&mut self, record: R, expected_updated_at: i64) -> Result<()> {
        let collection = R::collection_name();
        let id = record.id().to_string();
        let data = serde_json::to_string(&record)?;

        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE records SET data = ?1, updated_at = ?2
             WHERE collection = ?3 AND id = ?4 AND updated_at = ?5",
            params![data, record.updated_at(), collection, id, expected_updated_at],
        )?;
        if changed == 0 {
            let found: Option<i64> = tx
                .query_row(
                    "SELECT updated_at FROM records WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            return match found {
                Some(found) => Err(StoreError::Conflict {
                    id: format!("{}/{}", collection, id),
                    expected: expected_updated_at,
                    found,
                }),
                None => Err(StoreError::NotFound(format!("{}/{}", collection, id))),
            };
        }
        write_indexes(&tx, collection, &id, &record)?;
        tx.commit()?;

        debug!(collection, %id, expected_updated_at, "Conditionally updated record");
        Ok(())
    }

    /// Delete a record by id. Deleting a missing record is a no-op so callers
    /// can expose idempotent deregistration.
    pub fn delete<R: Record>(&mut self, id: &str) -> Result<()> {
        let collection = R::collection_name();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        tx.commit()?;

        debug!(collection, %id, "Deleted record");
        Ok(())
    }

    /// List records matching all filters (empty filter list returns the
    /// whole collection), ordered by id for stable output.
    pub fn list<R: Record>(&self, filters: &[Filter]) -> Result<Vec<R>> {
        let collection = R::collection_name();

        let mut sql = String::from("SELECT data FROM records r WHERE r.collection = ?1");
        let mut values: Vec<String> = Vec::new();
        for filter in filters {
            let field_param = 2 + values.len();
            let op = match filter.op {
                FilterOp::Eq => "=",
            };
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_index i WHERE i.collection = r.collection \
                 AND i.id = r.id AND i.field = ?{} AND i.value {} ?{})",
                field_param,
                op,
                field_param + 1
            ));
            values.push(filter.field.clone());
            values.push(filter.value.encode());
        }
        sql.push_str(" ORDER BY r.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&collection];
        for value in &values {
            params.push(value);
        }

        let mut rows = stmt.query(params.as_slice())?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let json: String = row.get(0)?;
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    /// Rewrite the index rows for every record in a collection. Called on
    /// open so filtered queries stay correct after schema or field changes.
    pub fn rebuild_indexes<R: Record>(&mut self) -> Result<usize> {
        let records: Vec<R> = self.list(&[])?;
        let collection = R::collection_name();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM record_index WHERE collection = ?1", params![collection])?;
        let count = records.len();
        for record in &records {
            write_indexes(&tx, collection, record.id(), record)?;
        }
        tx.commit()?;

        debug!(collection, count, "Rebuilt indexes");
        Ok(count)
    }
}

/// Replace the index rows for a single record
fn write_indexes<R: Record>(
    tx: &rusqlite::Transaction<'_>,
    collection: &str,
    id: &str,
    record: &R,
) -> Result<()> {
    tx.execute(
        "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    for (field, value) in record.indexed_fields() {
        tx.execute(
            "INSERT INTO record_index (collection, id, field, value) VALUES (?1, ?2, ?3, ?4)",
            params![collection, id, field, value.encode()],
        )?;
    }
    Ok(())
}

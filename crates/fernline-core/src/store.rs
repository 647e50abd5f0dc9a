//! Store handle: one DuckDB connection for the lifetime of a run.
//!
//! The migration tool is single-shot and single-threaded, so there is no
//! pooling here. The handle is opened once, used sequentially, and closed
//! once at the end of the run.

use duckdb::{params, Connection};
use std::path::Path;
use tracing::debug;

use crate::encryption::KeyMaterial;
use crate::error::StoreError;

/// Catalog name the encrypted database file is attached under.
const ATTACHED_CATALOG: &str = "fern_db";

/// Default schema for unqualified legacy tables.
const PRIMARY_SCHEMA: &str = "main";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open an unencrypted file-backed store directly.
    pub fn open_plain(db_path: &Path) -> Result<Self, StoreError> {
        debug!(path = %db_path.display(), "opening plain store");
        let conn = Connection::open(db_path)?;
        Ok(Self { conn })
    }

    /// Open an encrypted store.
    ///
    /// The encryption key is a property of attachment, not of an open
    /// connection, so this goes through a transient in-memory session:
    /// attach the file under the hex key, then make the attached catalog
    /// the active one for every later statement.
    pub fn open_encrypted(db_path: &Path, key: &KeyMaterial) -> Result<Self, StoreError> {
        let KeyMaterial::Hex(key_hex) = key else {
            return Err(StoreError::Metadata(
                "encrypted store requires derived key material".to_string(),
            ));
        };
        debug!(path = %db_path.display(), "attaching encrypted store");
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&format!(
            "ATTACH '{}' AS {ATTACHED_CATALOG} (ENCRYPTION_KEY '{}')",
            db_path.display(),
            key_hex.as_str(),
        ))?;
        conn.execute_batch(&format!("USE {ATTACHED_CATALOG}"))?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Whether `table` exists in `schema` (`None` means the primary
    /// unqualified schema). Pure catalog read, safe to call repeatedly.
    pub fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool, StoreError> {
        let schema = schema.unwrap_or(PRIMARY_SCHEMA);
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
            params![schema, table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Execute a statement that returns no rows.
    pub fn execute(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Row count of a table. Identifiers come from the compiled-in
    /// registry, never from user input.
    pub fn count_rows(&self, schema: Option<&str>, table: &str) -> Result<i64, StoreError> {
        let qualified = match schema {
            Some(s) => format!("{s}.{table}"),
            None => table.to_string(),
        };
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {qualified}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Close the connection. Called once at the end of the run on every
    /// exit path; drop covers fatal aborts mid-run.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Database(e))
    }
}

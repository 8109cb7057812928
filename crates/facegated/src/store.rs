//! SQLite-backed identity store.
//!
//! Schema: `identities(id, name, embedding TEXT)` plus the optional view
//! `identities_with_embeddings(id, name, embedding_text)` that serves as the
//! pre-joined read path. Each call opens its own connection.

use facegate_core::{Descriptor, IdentityRow, IdentityStore, StoreError, StoredEmbedding};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    embedding  TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS identities_name ON identities(name);
";

const PREJOINED_VIEW: &str = "
CREATE VIEW IF NOT EXISTS identities_with_embeddings AS
    SELECT id, name, embedding AS embedding_text
    FROM identities
    WHERE embedding IS NOT NULL;
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the database file and schema if missing.
    pub fn migrate(&self, with_view: bool) -> rusqlite::Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        if with_view {
            conn.execute_batch(PREJOINED_VIEW)?;
        }
        tracing::info!(path = %self.path.display(), with_view, "identity store ready");
        Ok(())
    }

    /// Open a connection without creating the file; a missing database is an error.
    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        Ok(conn)
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<IdentityRow>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let rows = stmt
            .query_map(params, read_row)
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        Ok(rows.into_iter().flatten().collect())
    }
}

/// Rows whose name is not valid text can never match an identity and are skipped.
fn read_row(row: &Row<'_>) -> rusqlite::Result<Option<IdentityRow>> {
    let id: i64 = row.get(0)?;
    let name = match row.get_ref(1)? {
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(name) => name.to_string(),
            Err(_) => {
                tracing::warn!(row = id, "skipping row with non-UTF-8 name");
                return Ok(None);
            }
        },
        other => {
            tracing::warn!(
                row = id,
                kind = %other.data_type(),
                "skipping row with non-text name"
            );
            return Ok(None);
        }
    };
    let embedding = match row.get_ref(2)? {
        ValueRef::Null => StoredEmbedding::Absent,
        ValueRef::Text(bytes) => StoredEmbedding::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(_) => StoredEmbedding::Other("integer"),
        ValueRef::Real(_) => StoredEmbedding::Other("real"),
        ValueRef::Blob(_) => StoredEmbedding::Other("blob"),
    };
    Ok(Some(IdentityRow {
        id,
        name,
        embedding,
    }))
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// A missing table or view means the read path was never provisioned.
fn classify(e: rusqlite::Error) -> StoreError {
    let msg = e.to_string();
    if msg.contains("no such table") {
        StoreError::Unprovisioned(msg)
    } else {
        StoreError::Backend(msg)
    }
}

impl IdentityStore for SqliteStore {
    fn fetch_prejoined(&self, identity: &str) -> Result<Vec<IdentityRow>, StoreError> {
        self.query(
            "SELECT id, name, embedding_text FROM identities_with_embeddings WHERE name = ?1",
            params![identity],
        )
    }

    fn fetch_table(&self) -> Result<Vec<IdentityRow>, StoreError> {
        self.query("SELECT id, name, embedding FROM identities ORDER BY id", [])
    }

    fn insert(&self, identity: &str, descriptor: &Descriptor) -> Result<i64, StoreError> {
        let text =
            serde_json::to_string(descriptor).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO identities (name, embedding) VALUES (?1, ?2)",
            params![identity, text],
        )
        .map_err(classify)?;
        Ok(conn.last_insert_rowid())
    }
}

//! Identity storage collaborator.
//!
//! The decision engine only reads `{name, embedding}` rows. A store exposes
//! two read paths: a pre-joined one that may not be provisioned everywhere,
//! and the raw identity table.

use crate::descriptor::{Descriptor, StoredEmbedding};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("retrieval path not provisioned: {0}")]
    Unprovisioned(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One stored identity row.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRow {
    pub id: i64,
    pub name: String,
    pub embedding: StoredEmbedding,
}

pub trait IdentityStore: Send + Sync {
    /// Rows from the pre-joined retrieval path. May already be filtered to
    /// `identity`; callers must not rely on it.
    fn fetch_prejoined(&self, identity: &str) -> Result<Vec<IdentityRow>, StoreError>;

    /// Every row of the raw identity table.
    fn fetch_table(&self) -> Result<Vec<IdentityRow>, StoreError>;

    /// Persist a descriptor under `identity`, returning the new row id.
    fn insert(&self, identity: &str, descriptor: &Descriptor) -> Result<i64, StoreError>;
}

/// In-memory store. Either read path can be switched off to exercise fallback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: Vec<IdentityRow>,
    prejoined: PathState,
    table: PathState,
}

/// Availability of one simulated read path.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PathState {
    #[default]
    Available,
    /// The path answers but with no rows.
    Empty,
    Unprovisioned,
    Failing(String),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row carrying an arbitrary stored embedding.
    pub fn push(&self, name: &str, embedding: StoredEmbedding) -> i64 {
        let mut inner = self.lock();
        let id = inner.rows.len() as i64 + 1;
        inner.rows.push(IdentityRow {
            id,
            name: name.to_string(),
            embedding,
        });
        id
    }

    pub fn set_prejoined(&self, state: PathState) {
        self.lock().prejoined = state;
    }

    pub fn set_table(&self, state: PathState) {
        self.lock().table = state;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // Rows are plain data; a panicked writer cannot leave them half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_path(
    state: &PathState,
    label: &str,
    rows: Vec<IdentityRow>,
) -> Result<Vec<IdentityRow>, StoreError> {
    match state {
        PathState::Available => Ok(rows),
        PathState::Empty => Ok(Vec::new()),
        PathState::Unprovisioned => Err(StoreError::Unprovisioned(label.to_string())),
        PathState::Failing(msg) => Err(StoreError::Backend(msg.clone())),
    }
}

impl IdentityStore for MemoryStore {
    fn fetch_prejoined(&self, identity: &str) -> Result<Vec<IdentityRow>, StoreError> {
        let inner = self.lock();
        // The pre-joined path serves the embedding as text, like a database view would.
        let rows = inner
            .rows
            .iter()
            .filter(|r| r.name == identity)
            .map(|r| IdentityRow {
                embedding: match &r.embedding {
                    StoredEmbedding::Native(v) => StoredEmbedding::Text(v.to_string()),
                    other => other.clone(),
                },
                ..r.clone()
            })
            .collect();
        read_path(&inner.prejoined, "prejoined", rows)
    }

    fn fetch_table(&self) -> Result<Vec<IdentityRow>, StoreError> {
        let inner = self.lock();
        read_path(&inner.table, "table", inner.rows.clone())
    }

    fn insert(&self, identity: &str, descriptor: &Descriptor) -> Result<i64, StoreError> {
        let value =
            serde_json::to_value(descriptor).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(self.push(identity, StoredEmbedding::Native(value)))
    }
}

//! Reference loading for one identity.
//!
//! Retrieval is a fixed two-step strategy: the pre-joined path first, and
//! the raw table when that path errors or comes back empty. Only a failure
//! of the raw table is fatal; rows that do not decode are dropped.

use crate::descriptor::Descriptor;
use crate::store::{IdentityRow, IdentityStore, StoreError};
use thiserror::Error;

/// One retrieval path, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    PreJoined,
    RawTable,
}

impl Retrieval {
    pub const PRECEDENCE: [Retrieval; 2] = [Retrieval::PreJoined, Retrieval::RawTable];

    fn fetch(
        self,
        store: &dyn IdentityStore,
        identity: &str,
    ) -> Result<Vec<IdentityRow>, StoreError> {
        match self {
            Retrieval::PreJoined => store.fetch_prejoined(identity),
            Retrieval::RawTable => store.fetch_table(),
        }
    }
}

/// Both retrieval paths failed to produce an answer.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to load identities: {fallback}")]
pub struct LoadError {
    /// Error from the pre-joined path, if it errored rather than came back empty.
    pub primary: Option<StoreError>,
    pub fallback: StoreError,
}

/// Validated references for one identity, assembled for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    pub descriptors: Vec<Descriptor>,
    /// Path that supplied the rows.
    pub source: Retrieval,
    /// Rows for the identity that failed validation.
    pub dropped: usize,
}

pub fn load_references(
    store: &dyn IdentityStore,
    identity: &str,
) -> Result<ReferenceSet, LoadError> {
    let mut primary_error = None;
    let mut fetched = None;

    for step in Retrieval::PRECEDENCE {
        match step.fetch(store, identity) {
            Ok(rows) if !rows.is_empty() || step == Retrieval::RawTable => {
                fetched = Some((step, rows));
                break;
            }
            Ok(_) => {
                tracing::debug!(?step, "retrieval path returned no rows; falling back");
            }
            Err(e) if step == Retrieval::RawTable => {
                return Err(LoadError {
                    primary: primary_error,
                    fallback: e,
                });
            }
            Err(e) => {
                tracing::warn!(?step, error = %e, "retrieval path failed; falling back");
                primary_error = Some(e);
            }
        }
    }

    let (source, rows) = fetched.unwrap_or((Retrieval::RawTable, Vec::new()));

    let mut descriptors = Vec::new();
    let mut dropped = 0;
    for row in rows.iter().filter(|r| r.name == identity) {
        match row.embedding.decode() {
            Ok(d) => descriptors.push(d),
            Err(e) => {
                dropped += 1;
                tracing::warn!(row = row.id, error = %e, "dropping invalid stored descriptor");
            }
        }
    }

    tracing::debug!(
        identity,
        ?source,
        loaded = descriptors.len(),
        dropped,
        "references loaded"
    );

    Ok(ReferenceSet {
        descriptors,
        source,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{StoredEmbedding, DESCRIPTOR_DIM};
    use crate::store::{MemoryStore, PathState};
    use serde_json::{json, Value};

    fn embedding(fill: f64) -> Value {
        Value::Array(vec![json!(fill); DESCRIPTOR_DIM])
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.push("alice", StoredEmbedding::Native(embedding(0.1)));
        store.push("alice", StoredEmbedding::Text(embedding(0.2).to_string()));
        store.push("bob", StoredEmbedding::Native(embedding(0.3)));
        store
    }

    #[test]
    fn test_prefers_prejoined_path() {
        let set = load_references(&seeded(), "alice").unwrap();
        assert_eq!(set.source, Retrieval::PreJoined);
        assert_eq!(set.descriptors.len(), 2);
        assert_eq!(set.dropped, 0);
    }

    #[test]
    fn test_falls_back_when_prejoined_unprovisioned() {
        let store = seeded();
        store.set_prejoined(PathState::Unprovisioned);
        let set = load_references(&store, "alice").unwrap();
        assert_eq!(set.source, Retrieval::RawTable);
        assert_eq!(set.descriptors.len(), 2);
    }

    #[test]
    fn test_falls_back_when_prejoined_empty() {
        let store = seeded();
        store.set_prejoined(PathState::Empty);
        let set = load_references(&store, "alice").unwrap();
        assert_eq!(set.source, Retrieval::RawTable);
        assert_eq!(set.descriptors.len(), 2);
    }

    #[test]
    fn test_filters_other_identities_exactly() {
        let store = seeded();
        store.push("Alice", StoredEmbedding::Native(embedding(0.1)));
        store.push("alice ", StoredEmbedding::Native(embedding(0.1)));
        store.set_prejoined(PathState::Unprovisioned);
        let set = load_references(&store, "alice").unwrap();
        assert_eq!(set.descriptors.len(), 2);

        let set = load_references(&store, "bob").unwrap();
        assert_eq!(set.descriptors.len(), 1);
    }

    #[test]
    fn test_drops_corrupt_rows() {
        let store = seeded();
        store.push("alice", StoredEmbedding::Text("{oops".into()));
        store.push("alice", StoredEmbedding::Native(json!([1.0, 2.0])));
        store.push("alice", StoredEmbedding::Absent);
        store.push("alice", StoredEmbedding::Other("number"));

        let set = load_references(&store, "alice").unwrap();
        assert_eq!(set.descriptors.len(), 2);
        assert_eq!(set.dropped, 4);
    }

    #[test]
    fn test_no_rows_is_not_an_error() {
        let set = load_references(&MemoryStore::new(), "alice").unwrap();
        assert!(set.descriptors.is_empty());
        assert_eq!(set.source, Retrieval::RawTable);
    }

    #[test]
    fn test_both_paths_failing_is_an_error() {
        let store = seeded();
        store.set_prejoined(PathState::Failing("rpc down".into()));
        store.set_table(PathState::Failing("table down".into()));
        let err = load_references(&store, "alice").unwrap_err();
        assert_eq!(err.primary, Some(StoreError::Backend("rpc down".into())));
        assert_eq!(err.fallback, StoreError::Backend("table down".into()));
    }

    #[test]
    fn test_fallback_failure_after_empty_primary_is_an_error() {
        let store = seeded();
        store.set_prejoined(PathState::Empty);
        store.set_table(PathState::Failing("table down".into()));
        let err = load_references(&store, "alice").unwrap_err();
        assert_eq!(err.primary, None);
    }

    #[test]
    fn test_table_failure_ignored_when_prejoined_answers() {
        let store = seeded();
        store.set_table(PathState::Failing("table down".into()));
        let set = load_references(&store, "alice").unwrap();
        assert_eq!(set.source, Retrieval::PreJoined);
    }
}

//! facegate-core — Face descriptor verification engine.
//!
//! Validates a submitted 128-d descriptor, loads the enrolled references
//! for one configured identity, scores them by cosine similarity and
//! applies the single/multi-reference acceptance policy.

pub mod descriptor;
pub mod extract;
pub mod policy;
pub mod repository;
pub mod service;
pub mod similarity;
pub mod store;

pub use descriptor::{Descriptor, DescriptorError, StoredEmbedding, DESCRIPTOR_DIM};
pub use extract::{DescriptorSource, ExtractError, Extraction};
pub use policy::{Decision, Policy, PolicyConfig, PolicyError, ThresholdPolicy};
pub use repository::{load_references, LoadError, ReferenceSet, Retrieval};
pub use service::{ErrorKind, IdentitySummary, VerificationService, VerifyError};
pub use similarity::cosine_similarity;
pub use store::{IdentityRow, IdentityStore, MemoryStore, StoreError};

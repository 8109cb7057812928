//! Verification service: validate, load, score, decide.
//!
//! Holds no per-request state. The store handle is injected at
//! construction, so one service can be cloned across concurrent handlers.

use crate::descriptor::{Descriptor, DescriptorError};
use crate::extract::{DescriptorSource, ExtractError, Extraction};
use crate::policy::{Decision, Policy, PolicyConfig, ThresholdPolicy};
use crate::repository::{load_references, LoadError};
use crate::store::{IdentityStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
    #[error(transparent)]
    StoreUnavailable(#[from] LoadError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

/// Who should act on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix the input.
    Client,
    /// Capture again.
    Retry,
    /// Storage or deployment problem.
    Server,
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::InvalidDescriptor(_) => ErrorKind::Client,
            VerifyError::NoFaceDetected => ErrorKind::Retry,
            VerifyError::StoreUnavailable(_)
            | VerifyError::Store(_)
            | VerifyError::Extraction(_) => ErrorKind::Server,
        }
    }
}

/// Listing entry for one stored row. Embeddings are never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub id: i64,
    pub name: String,
    /// Whether the stored embedding passes validation.
    pub valid: bool,
}

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn IdentityStore>,
    identity: String,
    policy: ThresholdPolicy,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        identity: impl Into<String>,
        config: PolicyConfig,
    ) -> Self {
        Self {
            store,
            identity: identity.into(),
            policy: ThresholdPolicy::new(config),
        }
    }

    /// The only identity this service can accept.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn policy_config(&self) -> &PolicyConfig {
        &self.policy.config
    }

    /// Verify an untrusted descriptor payload.
    ///
    /// Invalid input is rejected before the store is touched.
    pub fn verify(&self, raw: &Value) -> Result<Decision, VerifyError> {
        let submitted = Descriptor::from_json(raw)?;
        self.verify_descriptor(&submitted)
    }

    pub fn verify_descriptor(&self, submitted: &Descriptor) -> Result<Decision, VerifyError> {
        let references = load_references(self.store.as_ref(), &self.identity)?;
        let decision = self.policy.decide(submitted, &references.descriptors);

        tracing::info!(
            identity = %self.identity,
            matched = decision.matched,
            best_similarity = decision.best_similarity,
            match_count = decision.match_count,
            compared_with = decision.compared_with,
            dropped = references.dropped,
            "verify decided"
        );
        Ok(decision)
    }

    /// Pull a descriptor from an extractor and verify it.
    pub fn verify_from(&self, source: &mut dyn DescriptorSource) -> Result<Decision, VerifyError> {
        match source.extract()? {
            Extraction::Face(values) => {
                let submitted = Descriptor::from_values(values)?;
                self.verify_descriptor(&submitted)
            }
            Extraction::NoFace => Err(VerifyError::NoFaceDetected),
        }
    }

    /// Store a new reference descriptor for the configured identity.
    pub fn enroll(&self, raw: &Value) -> Result<i64, VerifyError> {
        let descriptor = Descriptor::from_json(raw)?;
        let id = self.store.insert(&self.identity, &descriptor)?;
        tracing::info!(identity = %self.identity, id, "reference enrolled");
        Ok(id)
    }

    /// Every row of the identity table with its validation status.
    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>, VerifyError> {
        let rows = self.store.fetch_table()?;
        Ok(rows
            .into_iter()
            .map(|row| IdentitySummary {
                valid: row.embedding.decode().is_ok(),
                id: row.id,
                name: row.name,
            })
            .collect())
    }
}

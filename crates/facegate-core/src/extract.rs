//! Boundary to the descriptor extraction pipeline.
//!
//! Detection, landmarking and encoding live outside this crate; all the
//! engine needs is "a vector, or no face".

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("extraction model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// What an extractor produced for one image or frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Face(Vec<f64>),
    NoFace,
}

/// Anything that can turn its current input into a face descriptor.
///
/// Implementations may be stateful (camera handles, model sessions),
/// hence `&mut self`.
pub trait DescriptorSource {
    fn extract(&mut self) -> Result<Extraction, ExtractError>;
}

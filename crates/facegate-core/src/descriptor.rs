//! Face descriptors and the boundary validator.
//!
//! A [`Descriptor`] can only be built through validation, so every value
//! that reaches scoring is exactly [`DESCRIPTOR_DIM`] finite reals.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Length of a face descriptor produced by the extraction model.
pub const DESCRIPTOR_DIM: usize = 128;

/// Why a value was refused as a descriptor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor must be an array, got {0}")]
    NotAnArray(&'static str),
    #[error("descriptor must have 128 elements, got {0}")]
    WrongLength(usize),
    #[error("descriptor element {index} is not a number")]
    NotANumber { index: usize },
    #[error("descriptor element {index} is not finite")]
    NonFinite { index: usize },
    #[error("stored descriptor text is not valid JSON: {0}")]
    MalformedText(String),
    #[error("no stored embedding")]
    Absent,
}

/// A validated 128-dimensional face encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f64>);

impl Descriptor {
    /// Validate an untyped JSON value (network payload or stored array).
    pub fn from_json(raw: &Value) -> Result<Self, DescriptorError> {
        let items = match raw {
            Value::Array(items) => items,
            other => return Err(DescriptorError::NotAnArray(json_kind(other))),
        };
        if items.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongLength(items.len()));
        }

        let mut values = Vec::with_capacity(DESCRIPTOR_DIM);
        for (index, item) in items.iter().enumerate() {
            let v = item.as_f64().ok_or(DescriptorError::NotANumber { index })?;
            if !v.is_finite() {
                return Err(DescriptorError::NonFinite { index });
            }
            values.push(v);
        }
        Ok(Self(values))
    }

    /// Decode a text-serialized descriptor, then validate it.
    pub fn from_text(text: &str) -> Result<Self, DescriptorError> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| DescriptorError::MalformedText(e.to_string()))?;
        Self::from_json(&parsed)
    }

    /// Validate raw values handed over by an extractor.
    pub fn from_values(values: Vec<f64>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongLength(values.len()));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// An embedding as it comes out of storage, before validation.
///
/// The pre-joined retrieval path hands back serialized text; the raw table
/// may hold either a native array or text depending on how the row was
/// written.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEmbedding {
    Native(Value),
    Text(String),
    /// A stored value of a kind that can never decode (number, object, blob).
    Other(&'static str),
    Absent,
}

impl StoredEmbedding {
    /// Tag an arbitrary JSON column value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::String(text) => Self::Text(text),
            v @ Value::Array(_) => Self::Native(v),
            other => Self::Other(json_kind(&other)),
        }
    }

    /// Parse-then-validate. Malformed rows come back as an error value, never a panic.
    pub fn decode(&self) -> Result<Descriptor, DescriptorError> {
        match self {
            Self::Native(value) => Descriptor::from_json(value),
            Self::Text(text) => Descriptor::from_text(text),
            Self::Other(kind) => Err(DescriptorError::NotAnArray(kind)),
            Self::Absent => Err(DescriptorError::Absent),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Extraction strategies: turn document text plus a target schema into
//! evidence-backed structured data using a [`StructuredModel`].
//!
//! [`StructuredModel`]: crate::model::StructuredModel

mod basic;
mod pivot;
pub mod prompt;

pub use basic::BasicStrategy;
pub use pivot::{PivotStrategy, DEFAULT_PIVOT_CONCURRENCY};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{LoaderError, StorageError};
use crate::model::ModelError;
use crate::schema::{self, SchemaError};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File '{0}' not found")]
    FileNotFound(String),

    #[error("Data model '{0}' not found")]
    DataModelNotFound(String),

    #[error("File '{0}' has an empty body")]
    EmptyFileBody(String),

    #[error("Pivoted extraction requires a pivot field")]
    PivotFieldRequired,

    #[error("Pivot field '{0}' is not a property of the target schema")]
    PivotFieldNotFound(String),

    #[error("Failed to extract pivot keys: {0}")]
    PivotKeyExtractionFailed(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Normalized document text from the loader.
    pub content: String,
    /// The target schema, not yet evidence-wrapped.
    pub schema: Value,
    pub pivot_field: Option<String>,
}

impl ExtractionRequest {
    pub fn new(content: impl Into<String>, schema: Value) -> Self {
        Self {
            content: content.into(),
            schema,
            pivot_field: None,
        }
    }

    pub fn pivot_on(mut self, field: impl Into<String>) -> Self {
        self.pivot_field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutput {
    /// The value persisted on the job.
    pub data: Value,
    /// What the model returned before shaping, kept for debugging.
    pub raw: Value,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput, ExtractionError>;
}

/// Evidence-wraps the target schema and makes sure `required` is present.
pub(crate) fn evidence_schema(target: &Value) -> Result<Value, SchemaError> {
    let mut evidence = schema::with_evidence(target)?;
    if let Some(object) = evidence.as_object_mut() {
        object.entry("required").or_insert_with(|| json!([]));
    }
    Ok(evidence)
}

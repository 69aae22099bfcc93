use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::prompt::{extraction_prompt, EXTRACTION_SCHEMA_NAME, EXTRACTION_SYSTEM};
use super::{evidence_schema, ExtractionError, ExtractionOutput, ExtractionRequest, ExtractionStrategy};
use crate::model::{ModelRequest, RequestPurpose, StructuredModel};

/// One model call over the whole document.
pub struct BasicStrategy {
    model: Arc<dyn StructuredModel>,
}

impl BasicStrategy {
    pub fn new(model: Arc<dyn StructuredModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ExtractionStrategy for BasicStrategy {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput, ExtractionError> {
        let schema = evidence_schema(&request.schema)?;

        let raw = self
            .model
            .generate(ModelRequest {
                purpose: RequestPurpose::Extraction,
                system: EXTRACTION_SYSTEM.to_string(),
                prompt: extraction_prompt(&request.content),
                schema_name: EXTRACTION_SCHEMA_NAME.to_string(),
                schema,
            })
            .await?;

        let data = match &raw {
            Value::Array(_) => json!({ "output": raw.clone() }),
            _ => raw.clone(),
        };

        Ok(ExtractionOutput { data, raw })
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::Instrument;

use super::prompt::{
    pivot_keys_prompt, pivot_row_prompt, EXTRACTION_SCHEMA_NAME, EXTRACTION_SYSTEM,
    PIVOT_KEYS_SCHEMA_NAME, PIVOT_KEYS_SYSTEM,
};
use super::{evidence_schema, ExtractionError, ExtractionOutput, ExtractionRequest, ExtractionStrategy};
use crate::concurrency::run_bounded;
use crate::model::{ModelRequest, RequestPurpose, StructuredModel};
use crate::schema;

pub const DEFAULT_PIVOT_CONCURRENCY: usize = 20;

/// Discovers the distinct values of a pivot field, then extracts one record
/// per value. Any failure aborts the whole extraction.
pub struct PivotStrategy {
    model: Arc<dyn StructuredModel>,
    concurrency: usize,
}

impl PivotStrategy {
    pub fn new(model: Arc<dyn StructuredModel>) -> Self {
        Self {
            model,
            concurrency: DEFAULT_PIVOT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn discover_keys(
        &self,
        content: &str,
        field: &str,
        description: Option<&str>,
    ) -> Result<Vec<String>, ExtractionError> {
        let reply = self
            .model
            .generate(ModelRequest {
                purpose: RequestPurpose::PivotKeys,
                system: PIVOT_KEYS_SYSTEM.to_string(),
                prompt: pivot_keys_prompt(content, field, description),
                schema_name: PIVOT_KEYS_SCHEMA_NAME.to_string(),
                schema: keys_schema(field),
            })
            .await
            .map_err(|e| ExtractionError::PivotKeyExtractionFailed(e.to_string()))?;

        parse_keys(&reply)
    }

    async fn extract_row(
        &self,
        content: &str,
        field: &str,
        schema: &Value,
        index: usize,
        key: String,
    ) -> Result<(usize, Value), ExtractionError> {
        log::debug!("Extracting pivot row {} = {:?}", field, key);

        let row = self
            .model
            .generate(ModelRequest {
                purpose: RequestPurpose::PivotRow { key: key.clone() },
                system: EXTRACTION_SYSTEM.to_string(),
                prompt: pivot_row_prompt(content, field, &key),
                schema_name: EXTRACTION_SCHEMA_NAME.to_string(),
                schema: schema.clone(),
            })
            .await?;

        Ok((index, row))
    }
}

#[async_trait]
impl ExtractionStrategy for PivotStrategy {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput, ExtractionError> {
        let field = request
            .pivot_field
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or(ExtractionError::PivotFieldRequired)?;

        let spec = schema::properties(&request.schema)?
            .get(field)
            .ok_or_else(|| ExtractionError::PivotFieldNotFound(field.to_string()))?;
        let description = spec.get("description").and_then(Value::as_str);
        let evidence = evidence_schema(&request.schema)?;

        self.run(&request.content, field, description, &evidence)
            .instrument(tracing::info_span!("pivot", field = field))
            .await
    }
}

impl PivotStrategy {
    async fn run(
        &self,
        content: &str,
        field: &str,
        description: Option<&str>,
        evidence: &Value,
    ) -> Result<ExtractionOutput, ExtractionError> {
        let keys = self.discover_keys(content, field, description).await?;
        log::info!("Pivot field '{}' has {} distinct values", field, keys.len());

        if keys.is_empty() {
            return Ok(ExtractionOutput {
                data: json!({ "rows": [] }),
                raw: json!({ "keys": [], "rows": [] }),
            });
        }

        let mut rows = run_bounded(
            keys.clone().into_iter().enumerate(),
            self.concurrency,
            |(index, key)| self.extract_row(content, field, evidence, index, key),
        )
        .await?;

        rows.sort_by_key(|(index, _)| *index);
        let rows: Vec<Value> = rows.into_iter().map(|(_, row)| row).collect();

        Ok(ExtractionOutput {
            data: json!({ "rows": rows.clone() }),
            raw: json!({ "keys": keys, "rows": rows }),
        })
    }
}

fn keys_schema(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "values": {
                "type": "array",
                "items": {"type": "string"},
                "description": format!("Distinct values of `{}` in the document", field),
            }
        },
        "required": ["values"],
        "additionalProperties": false,
    })
}

/// Accepts `{values: [...]}` or a bare array. Values are trimmed, empty ones
/// dropped, and duplicates removed keeping the first occurrence.
fn parse_keys(reply: &Value) -> Result<Vec<String>, ExtractionError> {
    let values = match reply {
        Value::Array(values) => values,
        Value::Object(map) => match map.get("values") {
            Some(Value::Array(values)) => values,
            _ => {
                return Err(ExtractionError::PivotKeyExtractionFailed(
                    "model reply has no 'values' array".to_string(),
                ))
            }
        },
        other => {
            return Err(ExtractionError::PivotKeyExtractionFailed(format!(
                "expected an array of values, got {}",
                json_kind(other)
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for value in values {
        let key = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            other => {
                return Err(ExtractionError::PivotKeyExtractionFailed(format!(
                    "pivot values must be scalars, got {}",
                    json_kind(other)
                )))
            }
        };
        if !key.is_empty() && seen.insert(key.clone()) {
            keys.push(key);
        }
    }

    Ok(keys)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

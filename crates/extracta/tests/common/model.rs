//! Scripted structured model.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use extracta::model::{ModelError, ModelRequest, RequestPurpose, StructuredModel};

/// Answers every call from a script instead of a provider.
///
/// - `Extraction` gets `extraction_reply`
/// - `PivotKeys` gets `{"values": pivot_keys}`
/// - `PivotRow { key }` gets `{row_field: {"answer": key, "rationale": ..}}`,
///   or a refusal when the key is listed in `refused_rows`
pub struct ScriptedModel {
    extraction_reply: Value,
    pivot_keys: Vec<String>,
    row_field: String,
    refused_rows: HashSet<String>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            extraction_reply: json!({}),
            pivot_keys: Vec::new(),
            row_field: "region".to_string(),
            refused_rows: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn extraction_reply(mut self, reply: Value) -> Self {
        self.extraction_reply = reply;
        self
    }

    pub fn pivot_keys(mut self, field: &str, keys: &[&str]) -> Self {
        self.row_field = field.to_string();
        self.pivot_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn refuse_row(mut self, key: &str) -> Self {
        self.refused_rows.insert(key.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, purpose: fn(&RequestPurpose) -> bool) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| purpose(&r.purpose))
            .count()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructuredModel for ScriptedModel {
    async fn generate(&self, request: ModelRequest) -> Result<Value, ModelError> {
        self.requests.lock().unwrap().push(request.clone());

        match request.purpose {
            RequestPurpose::Extraction => Ok(self.extraction_reply.clone()),
            RequestPurpose::PivotKeys => Ok(json!({ "values": self.pivot_keys })),
            RequestPurpose::PivotRow { key } => {
                if self.refused_rows.contains(&key) {
                    return Err(ModelError::Refused(format!("row {}", key)));
                }
                let mut row = Map::new();
                let rationale = format!("rows for {}", key);
                row.insert(
                    self.row_field.clone(),
                    json!({"answer": key, "rationale": rationale}),
                );
                Ok(Value::Object(row))
            }
        }
    }
}

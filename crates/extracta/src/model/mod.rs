//! Structured-output language model abstraction.
//!
//! A [`StructuredModel`] takes a prompt plus a JSON Schema and returns a JSON
//! value that the provider has constrained to that schema.

mod openai;

pub use openai::{
    OpenAiCompatibleModel, DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS,
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model refused the request: {0}")]
    Refused(String),
}

/// Why a model call is being made. Providers may use it for routing or
/// logging; scripted test models use it to pick a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPurpose {
    Extraction,
    PivotKeys,
    PivotRow { key: String },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub purpose: RequestPurpose,
    pub system: String,
    pub prompt: String,
    /// Identifier for the response schema (`^[a-zA-Z0-9_-]+$`).
    pub schema_name: String,
    pub schema: Value,
}

#[async_trait]
pub trait StructuredModel: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<Value, ModelError>;
}

/// Finds the first balanced JSON object or array in free text.
///
/// Providers without strict structured output sometimes wrap the payload in
/// prose or code fences. Tracks string boundaries and escapes so braces
/// inside strings do not count.
pub fn extract_json(response: &str) -> Option<&str> {
    let start = response.find(['{', '['])?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parses model output as JSON, falling back to the first embedded JSON block.
pub fn parse_json_output(text: &str) -> Result<Value, ModelError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    let block = extract_json(text).ok_or_else(|| {
        ModelError::InvalidResponse(format!(
            "no JSON found in model output: {}",
            crate::sanitize::truncate_for_log(text)
        ))
    })?;

    serde_json::from_str(block)
        .map_err(|e| ModelError::InvalidResponse(format!("malformed JSON in model output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_simple() {
        let response = r#"Here you go: {"values": ["A", "B"]} hope that helps"#;
        assert_eq!(extract_json(response), Some(r#"{"values": ["A", "B"]}"#));
    }

    #[test]
    fn test_extract_json_braces_in_strings() {
        let response = r#"```json
{"note": "a } inside", "nested": {"x": "\"{"}}
```"#;
        let block = extract_json(response).unwrap();
        let value: Value = serde_json::from_str(block).unwrap();
        assert_eq!(value["note"], json!("a } inside"));
    }

    #[test]
    fn test_extract_json_array() {
        assert_eq!(extract_json("keys: [\"a\", \"b\"]."), Some("[\"a\", \"b\"]"));
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert_eq!(extract_json("{\"open\": true"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_json_output() {
        assert_eq!(parse_json_output(" {\"a\": 1} ").unwrap(), json!({"a": 1}));
        assert_eq!(
            parse_json_output("Result:\n{\"a\": 2}\n").unwrap(),
            json!({"a": 2})
        );
        assert!(matches!(
            parse_json_output("nothing"),
            Err(ModelError::InvalidResponse(_))
        ));
    }
}

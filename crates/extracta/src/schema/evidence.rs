use serde_json::{json, Map, Value};

use super::{properties, SchemaError};

pub const RATIONALE_DESCRIPTION: &str = "Explain why this answer was chosen, quoting or \
     pointing to the supporting passage in the document. Use null only when the document \
     offers no evidence.";

/// Wraps every property as `{answer, rationale}` so the model has to justify
/// each value it returns. The input schema is left untouched.
pub fn with_evidence(schema: &Value) -> Result<Value, SchemaError> {
    let original = properties(schema)?;

    let wrapped: Map<String, Value> = original
        .iter()
        .map(|(name, spec)| (name.clone(), wrap_property(spec)))
        .collect();

    let mut evidence = schema.as_object().cloned().unwrap_or_default();
    evidence.insert("type".to_string(), json!("object"));
    evidence.insert("properties".to_string(), Value::Object(wrapped));

    Ok(Value::Object(evidence))
}

fn wrap_property(spec: &Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": spec,
            "rationale": {
                "type": ["string", "null"],
                "description": RATIONALE_DESCRIPTION,
            },
        },
        "required": ["answer", "rationale"],
        "additionalProperties": false,
    })
}

/// Drops rationales from an evidence-shaped result, keeping only the answers.
///
/// Accepts a single record, a `{rows: [...]}` pivot result, or an
/// `{output: [...]}` array result. Values that are not evidence-shaped are
/// kept as they are.
pub fn strip_evidence(data: &Value) -> Value {
    match data {
        Value::Object(map) if map.len() == 1 => {
            if let Some((key @ ("rows" | "output"), Value::Array(items))) =
                map.iter().next().map(|(k, v)| (k.as_str(), v))
            {
                return json!({ key: items.iter().map(strip_record).collect::<Vec<_>>() });
            }
            strip_record(data)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_record).collect()),
        _ => strip_record(data),
    }
}

fn strip_record(record: &Value) -> Value {
    let Value::Object(fields) = record else {
        return record.clone();
    };

    let stripped = fields
        .iter()
        .map(|(name, value)| {
            let answer = match value {
                Value::Object(wrapped) if is_evidence(wrapped) => {
                    wrapped.get("answer").cloned().unwrap_or(Value::Null)
                }
                other => other.clone(),
            };
            (name.clone(), answer)
        })
        .collect();

    Value::Object(stripped)
}

fn is_evidence(wrapped: &Map<String, Value>) -> bool {
    wrapped.contains_key("answer")
        && wrapped
            .keys()
            .all(|key| key == "answer" || key == "rationale")
}

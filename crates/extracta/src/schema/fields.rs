use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::type_meta::{value_branch, TypeMeta};
use super::{properties, SchemaError};

pub const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    pub fn from_json_type(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "integer" => Some(FieldType::Integer),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }
}

/// One field of a data model as an editor presents it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            field_type,
            description: None,
            nullable: false,
            required: false,
            enum_values: None,
            format: None,
        }
    }
}

/// Builds a draft-07 object schema from field definitions.
///
/// Nullable fields use the `type: [T, "null"]` encoding; only fields marked
/// required are listed in `required`.
pub fn schema_from_fields(fields: &[FieldDefinition]) -> Value {
    let mut props = Map::new();
    let mut required = Vec::new();

    for field in fields {
        let mut spec = Map::new();
        let type_value = if field.nullable {
            json!([field.field_type.as_str(), "null"])
        } else {
            json!(field.field_type.as_str())
        };
        spec.insert("type".to_string(), type_value);

        if let Some(description) = &field.description {
            spec.insert("description".to_string(), json!(description));
        }
        if let Some(values) = &field.enum_values {
            let mut values = values.clone();
            if field.nullable && !values.contains(&Value::Null) {
                values.push(Value::Null);
            }
            spec.insert("enum".to_string(), Value::Array(values));
        }
        if let Some(format) = &field.format {
            spec.insert("format".to_string(), json!(format));
        }

        props.insert(field.id.clone(), Value::Object(spec));
        if field.required {
            required.push(json!(field.id));
        }
    }

    json!({
        "$schema": DRAFT_07,
        "type": "object",
        "additionalProperties": false,
        "properties": props,
        "required": required,
    })
}

/// Reads field definitions back from a target schema, in property order.
/// Properties without a recognizable type are read as strings.
pub fn fields_from_schema(schema: &Value) -> Result<Vec<FieldDefinition>, SchemaError> {
    let props = properties(schema)?;
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let fields = props
        .iter()
        .map(|(id, spec)| {
            let meta = TypeMeta::parse(spec);
            let branch = value_branch(spec);
            let field_type = meta
                .primary
                .as_deref()
                .and_then(FieldType::from_json_type)
                .unwrap_or_else(|| {
                    log::debug!("Field '{}' has no recognised type, reading as string", id);
                    FieldType::String
                });

            let text = |key: &str| {
                spec.get(key)
                    .or_else(|| branch.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            let enum_values = spec
                .get("enum")
                .or_else(|| branch.get("enum"))
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter(|v| !v.is_null())
                        .cloned()
                        .collect::<Vec<_>>()
                });

            FieldDefinition {
                id: id.clone(),
                field_type,
                description: text("description"),
                nullable: meta.nullable,
                required: required.contains(&id.as_str()),
                enum_values,
                format: text("format"),
            }
        })
        .collect();

    Ok(fields)
}

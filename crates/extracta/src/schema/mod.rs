//! Target schemas: nullability handling, evidence wrapping, and the
//! field-list representation used by data-model editors.

mod evidence;
mod fields;
mod type_meta;

pub use evidence::{strip_evidence, with_evidence, RATIONALE_DESCRIPTION};
pub use fields::{fields_from_schema, schema_from_fields, FieldDefinition, FieldType};
pub use type_meta::TypeMeta;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// Returns the non-empty `properties` object of a target schema.
pub fn properties(schema: &Value) -> Result<&Map<String, Value>, SchemaError> {
    let properties = schema
        .get("properties")
        .ok_or_else(|| SchemaError::InvalidSchema("schema has no 'properties'".to_string()))?
        .as_object()
        .ok_or_else(|| SchemaError::InvalidSchema("'properties' must be an object".to_string()))?;

    if properties.is_empty() {
        return Err(SchemaError::InvalidSchema(
            "'properties' must declare at least one field".to_string(),
        ));
    }

    Ok(properties)
}

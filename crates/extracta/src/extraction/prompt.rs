//! Prompt text for extraction calls.

use crate::sanitize::sanitize_for_prompt;

pub const EXTRACTION_SYSTEM: &str = "You extract structured data from documents. \
Fill in every field of the response schema using only information found in the document. \
For each field return the answer together with a rationale that points to the passage it \
came from. When the document does not contain the information, answer null. Never invent values.";

pub const PIVOT_KEYS_SYSTEM: &str = "You list the distinct values a field takes in a document. \
Return every distinct value exactly once, in the order it first appears, copied as written in \
the document. Return an empty list when the field never appears.";

pub const EXTRACTION_SCHEMA_NAME: &str = "extraction";
pub const PIVOT_KEYS_SCHEMA_NAME: &str = "pivot_keys";

/// The document wrapped in delimiters the model is told to treat as data.
pub fn extraction_prompt(content: &str) -> String {
    format!(
        "Extract the requested data from the document below.\n\n\
         <document>\n{}\n</document>",
        sanitize_for_prompt(content)
    )
}

pub fn pivot_keys_prompt(content: &str, field: &str, description: Option<&str>) -> String {
    let mut prompt = format!(
        "List every distinct value of the field `{}` found in the document below.",
        sanitize_for_prompt(field)
    );
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nField description: {}",
            sanitize_for_prompt(description)
        ));
    }
    prompt.push_str(&format!(
        "\n\n<document>\n{}\n</document>",
        sanitize_for_prompt(content)
    ));
    prompt
}

/// Narrows extraction to the single record where `field` equals `key`.
pub fn focus_directive(field: &str, key: &str) -> String {
    format!(
        "Focus on `{} = \"{}\"`",
        sanitize_for_prompt(field),
        sanitize_for_prompt(key)
    )
}

pub fn pivot_row_prompt(content: &str, field: &str, key: &str) -> String {
    format!(
        "{}\n\n{}. Only extract the data that belongs to this value.",
        extraction_prompt(content),
        focus_directive(field, key)
    )
}

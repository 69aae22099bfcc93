//! Helpers for sanitizing data before it reaches logs or model prompts.
//!
//! Logs are safe to share for debugging: these functions keep full paths
//! and oversized model replies out of them, and stop document text from
//! posing as chat-template control tokens.

use std::path::Path;

/// Maximum characters of a model reply or error body kept in a log line.
pub const MAX_LOG_BODY_LENGTH: usize = 200;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Truncates text for logging, cutting on a char boundary.
pub fn truncate_for_log(text: &str) -> String {
    match text.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Breaks up chat-template control sequences embedded in document text so
/// the model sees them as plain characters.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
        .replace("</document>", "< /document >")
}

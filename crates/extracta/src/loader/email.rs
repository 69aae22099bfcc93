use std::path::Path;

use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use serde_json::{json, Map, Value};

use crate::error::LoaderError;
use crate::loader::markdown::html_to_markdown;
use crate::loader::{read_bytes, ContentLoader, LoadResult};

/// Reads RFC 822 messages: the HTML body (as Markdown) when there is one,
/// otherwise the plain-text body.
pub struct EmailLoader;

impl EmailLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmailLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for EmailLoader {
    fn name(&self) -> &'static str {
        "email"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "message/rfc822"
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let raw = read_bytes(path)?;

        let message = MessageParser::default()
            .parse(&raw)
            .ok_or_else(|| LoaderError::Email("Failed to parse email message".to_string()))?;

        let content = match first_body(&message, true) {
            Some(html) => html_to_markdown(&html),
            None => first_body(&message, false).unwrap_or_default(),
        };

        log::debug!(
            "Parsed email subject={:?}",
            message.subject().unwrap_or("(no subject)")
        );

        Ok(LoadResult::with_metadata(content.trim().to_string(), email_metadata(&message)))
    }
}

fn first_body(message: &Message, html: bool) -> Option<String> {
    message
        .parts
        .iter()
        .filter(|part| !is_attachment(part))
        .find_map(|part| match (&part.body, html) {
            (PartType::Html(body), true) => Some(body.to_string()),
            (PartType::Text(body), false) => Some(body.to_string()),
            _ => None,
        })
}

fn is_attachment(part: &MessagePart) -> bool {
    if let Some(disposition) = part.content_disposition() {
        if disposition.ctype() == "attachment" {
            return true;
        }
    }
    part.attachment_name().is_some()
}

fn email_metadata(message: &Message) -> Map<String, Value> {
    let mut metadata = Map::new();

    if let Some(subject) = message.subject() {
        metadata.insert("subject".to_string(), json!(subject));
    }
    if let Some(from) = message.from().map(format_address_list) {
        metadata.insert("from".to_string(), json!(from));
    }
    if let Some(to) = message.to().map(format_address_list) {
        metadata.insert("to".to_string(), json!(to));
    }
    if let Some(date) = message.date() {
        metadata.insert("date".to_string(), json!(date.to_rfc3339()));
    }
    metadata.insert(
        "attachments".to_string(),
        json!(message.attachment_count()),
    );

    metadata
}

fn format_address_list(address: &Address) -> String {
    let formatted: Vec<String> = match address {
        Address::List(list) => list.iter().map(format_address).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter().map(format_address))
            .collect(),
    };
    formatted.join(", ")
}

/// "Name <email@example.com>" when a display name is present.
fn format_address(addr: &mail_parser::Addr) -> String {
    if let Some(name) = addr.name() {
        format!("{} <{}>", name, addr.address().unwrap_or_default())
    } else {
        addr.address().unwrap_or_default().to_string()
    }
}

//! Content loaders: turn a downloaded file into normalized text for the model.
//!
//! Loaders are selected by MIME type. The registry scans its loaders in order
//! and uses the first one that claims the type; the fallback loader at the end
//! claims everything and yields empty content.

pub mod docx;
pub mod email;
pub mod fallback;
pub mod html;
pub mod markdown;
pub mod pdf;
pub mod spreadsheet;
pub mod text;

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::LoaderError;

/// Normalized text plus optional loader-specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl LoadResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata: Some(metadata),
        }
    }

    /// True when the loader found nothing the model could read.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

pub trait ContentLoader: Send + Sync {
    /// Short name used in logs and spans.
    fn name(&self) -> &'static str;
    fn supports(&self, mime_type: &str) -> bool;
    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError>;
}

pub struct LoaderRegistry {
    loaders: Vec<Box<dyn ContentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        let loaders: Vec<Box<dyn ContentLoader>> = vec![
            Box::new(pdf::PdfLoader::new()),
            Box::new(docx::DocxLoader::new()),
            Box::new(spreadsheet::SpreadsheetLoader::new()),
            Box::new(email::EmailLoader::new()),
            Box::new(html::HtmlLoader::new()),
            Box::new(text::TextLoader::new()),
        ];

        Self::with_loaders(loaders)
    }

    /// Builds a registry from custom loaders. The fallback loader is always
    /// appended so dispatch never comes up empty.
    pub fn with_loaders(mut loaders: Vec<Box<dyn ContentLoader>>) -> Self {
        loaders.push(Box::new(fallback::FallbackLoader));
        Self { loaders }
    }

    /// Returns the loader that would handle `mime_type`.
    pub fn resolve(&self, mime_type: &str) -> &dyn ContentLoader {
        let mime = normalize_mime(mime_type);
        self.loaders
            .iter()
            .find(|loader| loader.supports(&mime))
            .map(|loader| loader.as_ref())
            .unwrap_or(&fallback::FallbackLoader)
    }

    pub fn load(&self, path: &Path, mime_type: &str) -> Result<LoadResult, LoaderError> {
        let loader = self.resolve(mime_type);
        let _span = tracing::info_span!("loader", loader = loader.name(), mime = mime_type).entered();

        let result = loader.load(path)?;
        if result.is_empty() {
            log::debug!(
                "Loader '{}' produced no text for {}",
                loader.name(),
                crate::sanitize::redact_path(path)
            );
        }
        Ok(result)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-cases a MIME type and drops parameters such as `; charset=utf-8`.
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Guesses a MIME type from a filename, defaulting to `application/octet-stream`.
pub fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, LoaderError> {
    std::fs::read(path).map_err(|e| LoaderError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })
}

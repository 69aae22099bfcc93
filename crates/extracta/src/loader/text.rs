use std::path::Path;

use crate::error::LoaderError;
use crate::loader::{read_bytes, ContentLoader, LoadResult};

const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/ld+json",
    "application/xml",
    "application/xhtml+xml",
    "application/csv",
];

/// Reads text-like files verbatim as UTF-8.
pub struct TextLoader;

impl TextLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for TextLoader {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type.starts_with("text/") || TEXT_APPLICATION_TYPES.contains(&mime_type)
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let bytes = read_bytes(path)?;
        let text = String::from_utf8(bytes).map_err(|_| LoaderError::Encoding {
            path: path.to_path_buf(),
        })?;

        Ok(LoadResult::text(text))
    }
}

use std::path::Path;

use crate::error::LoaderError;
use crate::loader::markdown::html_to_markdown;
use crate::loader::{read_bytes, ContentLoader, LoadResult};

pub struct HtmlLoader;

impl HtmlLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for HtmlLoader {
    fn name(&self) -> &'static str {
        "html"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "text/html"
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let bytes = read_bytes(path)?;
        // Web pages in the wild are not always clean UTF-8.
        let html = String::from_utf8_lossy(&bytes);

        Ok(LoadResult::text(html_to_markdown(&html)))
    }
}

use std::path::Path;

use serde_json::{json, Map};

use crate::error::LoaderError;
use crate::loader::{read_bytes, ContentLoader, LoadResult};

/// Extracts embedded text page by page.
///
/// `metadata.pages` is the highest page number seen while walking the page
/// tree, not the `/Count` entry, which is unreliable in the wild.
pub struct PdfLoader;

impl PdfLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for PdfLoader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "application/pdf"
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let pdf_bytes = read_bytes(path)?;

        let doc = lopdf::Document::load_mem(&pdf_bytes)
            .map_err(|e| LoaderError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let (content, pages) = extract_pages(&doc);

        let mut metadata = Map::new();
        metadata.insert("pages".to_string(), json!(pages));

        Ok(LoadResult::with_metadata(content, metadata))
    }
}

fn extract_pages(doc: &lopdf::Document) -> (String, u32) {
    let mut page_texts = Vec::new();
    let mut max_page = 0;

    for (page_num, _) in doc.get_pages() {
        max_page = max_page.max(page_num);
        match doc.extract_text(&[page_num]) {
            Ok(text) => page_texts.push(text.trim().to_string()),
            Err(e) => log::warn!("Skipping unreadable PDF page {}: {}", page_num, e),
        }
    }

    (page_texts.join("\n\n"), max_page)
}

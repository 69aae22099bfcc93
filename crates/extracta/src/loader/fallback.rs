use std::path::Path;

use crate::error::LoaderError;
use crate::loader::{ContentLoader, LoadResult};

/// Last-resort loader. Claims every MIME type and yields no text.
pub struct FallbackLoader;

impl ContentLoader for FallbackLoader {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn supports(&self, _mime_type: &str) -> bool {
        true
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        log::debug!(
            "No loader for {}, returning empty content",
            crate::sanitize::redact_path(path)
        );
        Ok(LoadResult::default())
    }
}

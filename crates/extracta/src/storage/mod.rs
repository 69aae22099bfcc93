//! Blob storage for uploaded source files.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

pub mod filesystem;

pub use filesystem::FilesystemBlobStore;

/// Object storage holding uploaded files under opaque keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copies the object at `key` to `dest`. Returns the number of bytes
    /// written; `StorageError::NotFound` when no such object exists.
    async fn download_file(&self, key: &str, dest: &Path) -> Result<u64, StorageError>;

    /// A URL a client can upload the object to.
    async fn upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError>;
}

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::BlobStore;
use crate::error::StorageError;

/// Blob store over a local directory. Keys map to relative paths below
/// `root`; anything that could escape it is rejected.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to its path, rejecting absolute keys, `..`, and
    /// anything that is not a plain relative path.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Writes a new object. Fails if the key is already taken.
    pub fn put(&self, key: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }

        // create_new gives an atomic check-and-create
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(key.to_string()),
                _ => StorageError::WriteFile {
                    path: path.clone(),
                    source: e,
                },
            })?;
        file.write_all(content).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        log::debug!(
            "Stored object {} ({} bytes)",
            crate::sanitize::redact_path(&path),
            content.len()
        );
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn download_file(&self, key: &str, dest: &Path) -> Result<u64, StorageError> {
        let source = self.object_path(key)?;
        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::ReadObject {
                    key: key.to_string(),
                    source: e,
                })
            }
        }

        if let Some(parent) = dest.parent() {
            ensure_directory(parent)?;
        }
        tokio::fs::copy(&source, dest)
            .await
            .map_err(|e| StorageError::WriteFile {
                path: dest.to_path_buf(),
                source: e,
            })
    }

    async fn upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let path = self.object_path(key)?;
        log::debug!("Upload URL requested for {} ({})", key, content_type);
        Ok(format!("file://{}", path.display()))
    }
}

//! Composes catalog lookups, blob download, loading, and an extraction
//! strategy into a single `extract` call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;

use crate::catalog::{DataModelCatalog, FileCatalog, FileRef};
use crate::extraction::{
    BasicStrategy, ExtractionError, ExtractionRequest, ExtractionStrategy, PivotStrategy,
};
use crate::loader::{guess_mime, normalize_mime, LoadResult, LoaderRegistry};
use crate::model::StructuredModel;
use crate::schema::SchemaError;
use crate::storage::BlobStore;

/// Produces the data for one extraction job.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Pivoted when `pivot_on` is set, basic otherwise.
    async fn extract(
        &self,
        user_id: &str,
        file_id: &str,
        data_model_id: &str,
        pivot_on: Option<&str>,
    ) -> Result<Value, ExtractionError>;
}

pub struct DocumentExtractor {
    files: Arc<dyn FileCatalog>,
    data_models: Arc<dyn DataModelCatalog>,
    blobs: Arc<dyn BlobStore>,
    loaders: Arc<LoaderRegistry>,
    basic: BasicStrategy,
    pivot: PivotStrategy,
}

impl DocumentExtractor {
    pub fn new(
        files: Arc<dyn FileCatalog>,
        data_models: Arc<dyn DataModelCatalog>,
        blobs: Arc<dyn BlobStore>,
        model: Arc<dyn StructuredModel>,
    ) -> Self {
        Self {
            files,
            data_models,
            blobs,
            loaders: Arc::new(LoaderRegistry::new()),
            basic: BasicStrategy::new(model.clone()),
            pivot: PivotStrategy::new(model),
        }
    }

    pub fn with_pivot_concurrency(mut self, concurrency: usize) -> Self {
        self.pivot = self.pivot.with_concurrency(concurrency);
        self
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = Arc::new(loaders);
        self
    }

    /// Downloads the file into `workdir` and runs it through the loaders.
    async fn load_file(
        &self,
        file_id: &str,
        file: &FileRef,
        workdir: &Path,
    ) -> Result<LoadResult, ExtractionError> {
        let staged = workdir.join(staged_name(&file.filename));
        let bytes = self.blobs.download_file(&file.s3_key, &staged).await?;
        if bytes == 0 {
            return Err(ExtractionError::EmptyFileBody(file_id.to_string()));
        }

        let mime = effective_mime(file);
        let loaders = self.loaders.clone();
        let loaded = tokio::task::spawn_blocking(move || loaders.load(&staged, &mime))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))??;

        if loaded.is_empty() {
            log::warn!(
                "No text could be loaded from file {} ({}); extracting from empty content",
                file_id,
                file.mime_type
            );
        }
        Ok(loaded)
    }
}

/// Staging name keeping only the original extension. Loaders pick formats
/// from the MIME type and the bytes, never from this name.
fn staged_name(filename: &str) -> PathBuf {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => PathBuf::from(format!("source.{}", ext.to_ascii_lowercase())),
        None => PathBuf::from("source"),
    }
}

/// The stored MIME type, or a guess from the filename when it is missing
/// or generic.
fn effective_mime(file: &FileRef) -> String {
    let stored = normalize_mime(&file.mime_type);
    if stored.is_empty() || stored == "application/octet-stream" {
        guess_mime(&file.filename)
    } else {
        stored
    }
}

#[async_trait]
impl Extractor for DocumentExtractor {
    async fn extract(
        &self,
        user_id: &str,
        file_id: &str,
        data_model_id: &str,
        pivot_on: Option<&str>,
    ) -> Result<Value, ExtractionError> {
        let span = tracing::info_span!(
            "extract",
            file_id,
            data_model_id,
            pivot = pivot_on.unwrap_or("")
        );
        async move {
            let file = self
                .files
                .get_file(user_id, file_id)
                .await?
                .into_file()
                .ok_or_else(|| ExtractionError::FileNotFound(file_id.to_string()))?;
            let data_model = self
                .data_models
                .get_data_model(user_id, data_model_id)
                .await?
                .ok_or_else(|| ExtractionError::DataModelNotFound(data_model_id.to_string()))?;

            let workdir = tempfile::Builder::new().prefix("extracta-").tempdir()?;
            let loaded = self.load_file(file_id, &file, workdir.path()).await?;
            drop(workdir);

            let schema: Value = serde_json::from_str(&data_model.schema_json).map_err(|e| {
                SchemaError::InvalidSchema(format!(
                    "data model '{}' is not valid JSON: {}",
                    data_model_id, e
                ))
            })?;

            let mut request = ExtractionRequest::new(loaded.content, schema);
            let output = match pivot_on {
                Some(field) => {
                    request = request.pivot_on(field);
                    self.pivot.extract(&request).await?
                }
                None => self.basic.extract(&request).await?,
            };

            log::info!("Extracted data for file {}", file_id);
            Ok(output.data)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::db::catalog_repo::{DataModelRow, FileRow};
    use crate::db::Database;
    use crate::model::{ModelError, ModelRequest, RequestPurpose};
    use crate::storage::FilesystemBlobStore;
    use serde_json::json;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl StructuredModel for Echo {
        async fn generate(&self, request: ModelRequest) -> Result<Value, ModelError> {
            match request.purpose {
                RequestPurpose::Extraction => Ok(json!({
                    "title": {"answer": request.prompt.contains("Quarterly"), "rationale": null}
                })),
                RequestPurpose::PivotKeys => Ok(json!({"values": ["A"]})),
                RequestPurpose::PivotRow { key } => Ok(json!({
                    "region": {"answer": key, "rationale": "row"}
                })),
            }
        }
    }

    struct Fixture {
        _blobs_dir: TempDir,
        extractor: DocumentExtractor,
    }

    async fn fixture(filename: &str, mime: &str, body: &[u8]) -> Fixture {
        let blobs_dir = TempDir::new().unwrap();
        let blobs = FilesystemBlobStore::new(blobs_dir.path());
        let key = format!("u1/f1/{}", filename);
        blobs.put(&key, body).unwrap();

        let catalog = SqliteCatalog::new(Database::open_in_memory().unwrap());
        catalog
            .register_file(FileRow {
                id: "f1".to_string(),
                user_id: "u1".to_string(),
                filename: filename.to_string(),
                mime_type: mime.to_string(),
                s3_key: key,
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .await
            .unwrap();
        catalog
            .register_data_model(DataModelRow {
                id: "m1".to_string(),
                user_id: "u1".to_string(),
                name: "Report".to_string(),
                schema_json: json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "boolean"},
                        "region": {"type": "string"}
                    }
                })
                .to_string(),
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .await
            .unwrap();

        let catalog = Arc::new(catalog);
        Fixture {
            _blobs_dir: blobs_dir,
            extractor: DocumentExtractor::new(
                catalog.clone(),
                catalog,
                Arc::new(blobs),
                Arc::new(Echo),
            ),
        }
    }

    #[tokio::test]
    async fn test_basic_extraction_sees_file_text() {
        let fx = fixture("report.txt", "text/plain", b"Quarterly report").await;
        let data = fx.extractor.extract("u1", "f1", "m1", None).await.unwrap();
        assert_eq!(data["title"]["answer"], json!(true));
    }

    #[tokio::test]
    async fn test_pivot_extraction() {
        let fx = fixture("report.txt", "text/plain", b"Region A").await;
        let data = fx
            .extractor
            .extract("u1", "f1", "m1", Some("region"))
            .await
            .unwrap();
        assert_eq!(data["rows"][0]["region"]["answer"], json!("A"));
    }

    #[tokio::test]
    async fn test_missing_file_and_model() {
        let fx = fixture("report.txt", "text/plain", b"x").await;
        let err = fx.extractor.extract("u2", "f1", "m1", None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound(id) if id == "f1"));

        let err = fx.extractor.extract("u1", "f1", "m9", None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::DataModelNotFound(id) if id == "m9"));
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let fx = fixture("empty.txt", "text/plain", b"").await;
        let err = fx.extractor.extract("u1", "f1", "m1", None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyFileBody(_)));
    }

    #[test]
    fn test_staged_name_keeps_extension_only() {
        assert_eq!(staged_name("../../Sales Q1.XLSX"), PathBuf::from("source.xlsx"));
        assert_eq!(staged_name("notes"), PathBuf::from("source"));
        assert_eq!(staged_name("weird.t/x"), PathBuf::from("source"));
    }

    #[test]
    fn test_effective_mime_guesses_generic_types() {
        let file = FileRef {
            filename: "data.csv".to_string(),
            mime_type: "application/octet-stream".to_string(),
            s3_key: "k".to_string(),
        };
        assert_eq!(effective_mime(&file), "text/csv");

        let typed = FileRef {
            mime_type: "Text/HTML; charset=utf-8".to_string(),
            ..file
        };
        assert_eq!(effective_mime(&typed), "text/html");
    }
}

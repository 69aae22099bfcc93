//! Test harness for isolated end-to-end runs.
//!
//! `TestHarness` owns everything a job execution touches:
//! - an in-memory SQLite database shared by the catalog and the job store
//! - a filesystem blob store rooted in a temporary directory
//! - a `ScriptedModel` standing in for the language model provider

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use extracta::catalog::SqliteCatalog;
use extracta::db::catalog_repo::{DataModelRow, FileRow};
use extracta::db::{now_timestamp, Database};
use extracta::jobs::{ExtractionJob, JobStore, NewExtraction, SqliteJobStore};
use extracta::orchestrator::RunExtraction;
use extracta::queue::QueueConsumer;
use extracta::storage::FilesystemBlobStore;
use extracta::DocumentExtractor;

use super::model::ScriptedModel;

pub const USER: &str = "user-1";

pub struct TestHarness {
    pub temp_dir: TempDir,
    pub db: Database,
    pub catalog: Arc<SqliteCatalog>,
    pub jobs: Arc<SqliteJobStore>,
    pub blobs: Arc<FilesystemBlobStore>,
    pub model: Arc<ScriptedModel>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_model(ScriptedModel::new())
    }

    pub fn with_model(model: ScriptedModel) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open_in_memory().expect("Failed to open database");
        let blobs = FilesystemBlobStore::new(temp_dir.path().join("blobs"));

        Self {
            catalog: Arc::new(SqliteCatalog::new(db.clone())),
            jobs: Arc::new(SqliteJobStore::new(db.clone())),
            blobs: Arc::new(blobs),
            model: Arc::new(model),
            db,
            temp_dir,
        }
    }

    /// Stores `body` under `{user}/{file_id}/{filename}` and registers it.
    pub async fn add_file(&self, file_id: &str, filename: &str, mime: &str, body: &[u8]) {
        let key = format!("{}/{}/{}", USER, file_id, filename);
        self.blobs.put(&key, body).expect("Failed to store blob");
        self.catalog
            .register_file(FileRow {
                id: file_id.to_string(),
                user_id: USER.to_string(),
                filename: filename.to_string(),
                mime_type: mime.to_string(),
                s3_key: key,
                created_at: now_timestamp(),
            })
            .await
            .expect("Failed to register file");
    }

    pub async fn add_data_model(&self, id: &str, schema: &Value) {
        let now = now_timestamp();
        self.catalog
            .register_data_model(DataModelRow {
                id: id.to_string(),
                user_id: USER.to_string(),
                name: format!("Model {}", id),
                schema_json: schema.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
            .await
            .expect("Failed to register data model");
    }

    pub async fn queue_job(&self, file_id: &str, data_model_id: &str, pivot_on: Option<&str>) -> ExtractionJob {
        let mut new = NewExtraction::new(USER, file_id, data_model_id);
        new.pivot_on = pivot_on.map(str::to_string);
        self.jobs
            .create_extraction(new)
            .await
            .expect("Failed to create job")
    }

    pub async fn job(&self, id: &str) -> ExtractionJob {
        self.jobs
            .get_extraction(id)
            .await
            .expect("Failed to read job")
            .expect("Job not found")
    }

    pub fn run_extraction(&self) -> Arc<RunExtraction> {
        let extractor = DocumentExtractor::new(
            self.catalog.clone(),
            self.catalog.clone(),
            self.blobs.clone(),
            self.model.clone(),
        )
        .with_pivot_concurrency(4);
        Arc::new(RunExtraction::new(self.jobs.clone(), Arc::new(extractor)))
    }

    pub fn consumer(&self, concurrency: usize) -> QueueConsumer {
        QueueConsumer::new(self.run_extraction(), concurrency)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

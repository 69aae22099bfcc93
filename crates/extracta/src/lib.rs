pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod extractor;
pub mod jobs;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod sanitize;
pub mod schema;
pub mod secrets;
pub mod storage;
pub mod telemetry;

pub use catalog::{DataModel, DataModelCatalog, FileCatalog, FileLookup, FileRef, SqliteCatalog};
pub use concurrency::{run_bounded, run_each};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, LoaderError, StorageError};
pub use extraction::{
    BasicStrategy, ExtractionError, ExtractionOutput, ExtractionRequest, ExtractionStrategy,
    PivotStrategy,
};
pub use extractor::{DocumentExtractor, Extractor};
pub use jobs::{
    reap_stale, ExtractionJob, JobError, JobOutcome, JobStatus, JobStore, NewExtraction,
    ReaperAction, SqliteJobStore,
};
pub use loader::{ContentLoader, LoadResult, LoaderRegistry};
pub use model::{ModelError, ModelRequest, OpenAiCompatibleModel, RequestPurpose, StructuredModel};
pub use orchestrator::{ExecuteOutcome, OrchestratorError, RunExtraction, SkipReason};
pub use queue::{BatchResponse, QueueConsumer, QueueMessage};
pub use schema::{strip_evidence, with_evidence, SchemaError, TypeMeta};
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use storage::{BlobStore, FilesystemBlobStore};

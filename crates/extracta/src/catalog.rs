//! Lookups of uploaded files and user data models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::catalog_repo::{self, DataModelRow, FileRow};
use crate::db::{Database, DatabaseError};

/// Where an uploaded file lives and what it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub filename: String,
    pub mime_type: String,
    pub s3_key: String,
}

/// Result of a file lookup. `file` is set iff `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLookup {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileLookup {
    pub fn found(file: FileRef) -> Self {
        Self {
            success: true,
            file: Some(file),
            error: None,
        }
    }

    pub fn missing(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file: None,
            error: Some(error.into()),
        }
    }

    /// The file, if the lookup succeeded.
    pub fn into_file(self) -> Option<FileRef> {
        if self.success {
            self.file
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModel {
    pub id: String,
    pub name: String,
    /// The target JSON Schema, serialized.
    pub schema_json: String,
}

#[async_trait]
pub trait FileCatalog: Send + Sync {
    async fn get_file(&self, user_id: &str, file_id: &str) -> Result<FileLookup, DatabaseError>;
}

#[async_trait]
pub trait DataModelCatalog: Send + Sync {
    async fn get_data_model(
        &self,
        user_id: &str,
        data_model_id: &str,
    ) -> Result<Option<DataModel>, DatabaseError>;
}

/// Both catalogs over the `files` and `data_models` tables.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    pub async fn register_file(&self, row: FileRow) -> Result<(), DatabaseError> {
        self.blocking(move |db| catalog_repo::insert_file(db, &row))
            .await
    }

    pub async fn register_data_model(&self, row: DataModelRow) -> Result<(), DatabaseError> {
        self.blocking(move |db| catalog_repo::upsert_data_model(db, &row))
            .await
    }
}

#[async_trait]
impl FileCatalog for SqliteCatalog {
    async fn get_file(&self, user_id: &str, file_id: &str) -> Result<FileLookup, DatabaseError> {
        let (user_id, file_id) = (user_id.to_string(), file_id.to_string());
        self.blocking(move |db| {
            Ok(match catalog_repo::find_file(db, &user_id, &file_id)? {
                Some(row) => FileLookup::found(FileRef {
                    filename: row.filename,
                    mime_type: row.mime_type,
                    s3_key: row.s3_key,
                }),
                None => FileLookup::missing(format!("File '{}' not found", file_id)),
            })
        })
        .await
    }
}

#[async_trait]
impl DataModelCatalog for SqliteCatalog {
    async fn get_data_model(
        &self,
        user_id: &str,
        data_model_id: &str,
    ) -> Result<Option<DataModel>, DatabaseError> {
        let (user_id, data_model_id) = (user_id.to_string(), data_model_id.to_string());
        self.blocking(move |db| {
            Ok(
                catalog_repo::find_data_model(db, &user_id, &data_model_id)?.map(|row| DataModel {
                    id: row.id,
                    name: row.name,
                    schema_json: row.schema_json,
                }),
            )
        })
        .await
    }
}

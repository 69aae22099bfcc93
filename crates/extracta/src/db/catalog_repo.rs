//! Uploaded file references and data models.
//!
//! Lookups are scoped by owner: a row belonging to another user reads as
//! absent.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub mime_type: String,
    pub s3_key: String,
    pub created_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            filename: row.get("filename")?,
            mime_type: row.get("mime_type")?,
            s3_key: row.get("s3_key")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataModelRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub schema_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DataModelRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            schema_json: row.get("schema_json")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert_file(db: &Database, row: &FileRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO files (id, user_id, filename, mime_type, s3_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.user_id,
                row.filename,
                row.mime_type,
                row.s3_key,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_file(db: &Database, user_id: &str, id: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM files WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                FileRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Inserts a data model, or replaces the schema of an existing one with the
/// same id.
pub fn upsert_data_model(db: &Database, row: &DataModelRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO data_models (id, user_id, name, schema_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                schema_json = excluded.schema_json,
                updated_at = excluded.updated_at",
            params![
                row.id,
                row.user_id,
                row.name,
                row.schema_json,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_data_model(
    db: &Database,
    user_id: &str,
    id: &str,
) -> Result<Option<DataModelRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM data_models WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                DataModelRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

//! Row-level access to the `extractions` table.
//!
//! Status changes are conditional updates; callers learn whether they won
//! from the returned `bool` (exactly one row changed).

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw extraction row. JSON columns are kept as text here.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRow {
    pub id: String,
    pub file_id: String,
    pub data_model_id: String,
    pub user_id: String,
    pub status: String,
    pub pivot_on: Option<String>,
    pub data: Option<String>,
    pub overrides: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ExtractionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_id: row.get("file_id")?,
            data_model_id: row.get("data_model_id")?,
            user_id: row.get("user_id")?,
            status: row.get("status")?,
            pivot_on: row.get("pivot_on")?,
            data: row.get("data")?,
            overrides: row.get("overrides")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(db: &Database, row: &ExtractionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extractions (id, file_id, data_model_id, user_id, status, pivot_on,
             data, overrides, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.id,
                row.file_id,
                row.data_model_id,
                row.user_id,
                row.status,
                row.pivot_on,
                row.data,
                row.overrides,
                row.error_message,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM extractions WHERE id = ?1",
                params![id],
                ExtractionRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All extractions of a file, newest first.
pub fn find_by_file(db: &Database, file_id: &str) -> Result<Vec<ExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extractions WHERE file_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(params![file_id], ExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a row from `from` to `to` only if it is still in `from`.
pub fn transition_status(
    db: &Database,
    id: &str,
    from: &str,
    to: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?2",
            params![id, from, to, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal success write: stores `data` and clears any error message.
pub fn mark_completed(
    db: &Database,
    id: &str,
    data: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET status = 'completed', data = ?2, error_message = NULL,
             updated_at = ?3 WHERE id = ?1",
            params![id, data, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal failure write. `data` is left as it was.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error_message: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET status = 'failed', error_message = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, error_message, updated_at],
        )?;
        Ok(changed == 1)
    })
}

pub fn set_overrides(
    db: &Database,
    id: &str,
    overrides: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET overrides = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, overrides, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Bumps `updated_at` of a row that is still `processing`.
pub fn touch_processing(db: &Database, id: &str, updated_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET updated_at = ?2 WHERE id = ?1 AND status = 'processing'",
            params![id, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Rows in `status` whose `updated_at` is strictly before `cutoff`.
pub fn find_stale(
    db: &Database,
    status: &str,
    cutoff: &str,
) -> Result<Vec<ExtractionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extractions WHERE status = ?1 AND updated_at < ?2
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt
            .query_map(params![status, cutoff], ExtractionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Resets a stuck `processing` row to `queued`, provided nobody touched it
/// since `observed_updated_at` was read.
pub fn requeue_if_unchanged(
    db: &Database,
    id: &str,
    observed_updated_at: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET status = 'queued', updated_at = ?3
             WHERE id = ?1 AND status = 'processing' AND updated_at = ?2",
            params![id, observed_updated_at, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Fails a stuck `processing` row, provided nobody touched it since
/// `observed_updated_at` was read.
pub fn fail_if_unchanged(
    db: &Database,
    id: &str,
    observed_updated_at: &str,
    error_message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extractions SET status = 'failed', error_message = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'processing' AND updated_at = ?2",
            params![id, observed_updated_at, error_message, updated_at],
        )?;
        Ok(changed == 1)
    })
}

pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM extractions WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

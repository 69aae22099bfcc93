//! Extraction jobs: the persisted record, its state machine, and the store
//! that guards transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::extraction_repo::ExtractionRow;
use crate::db::DatabaseError;

pub mod reaper;
pub mod store;

pub use reaper::{reap_before, reap_stale, ReaperAction, TIMEOUT_ERROR_MESSAGE};
pub use store::{JobStore, SqliteJobStore};

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Extraction job '{0}' not found")]
    NotFound(String),

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Invalid job record: {0}")]
    Serialization(String),

    #[error("Job store task failed: {0}")]
    Task(String),
}

// ─── Status ─────────────────────────────────────────────────────────────────

/// Lifecycle of an extraction job.
///
/// `Queued` is initial; `Completed` and `Failed` are terminal. `Processing`
/// may fall back to `Queued` only when a stale job is re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::Serialization(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

// ─── Records ────────────────────────────────────────────────────────────────

/// A persisted extraction request and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub id: String,
    pub file_id: String,
    pub data_model_id: String,
    pub user_id: String,
    pub status: JobStatus,
    /// Field to pivot on; selects the pivoted strategy. Never changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pivot_on: Option<String>,
    /// Present only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// User corrections, stored verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionJob {
    pub fn from_row(row: ExtractionRow) -> Result<Self, JobError> {
        let status = row.status.parse()?;
        let data = parse_json_column(row.data.as_deref(), "data", &row.id)?;
        let overrides = parse_json_column(row.overrides.as_deref(), "overrides", &row.id)?;
        Ok(Self {
            status,
            data,
            overrides,
            created_at: parse_timestamp(&row.created_at, &row.id)?,
            updated_at: parse_timestamp(&row.updated_at, &row.id)?,
            id: row.id,
            file_id: row.file_id,
            data_model_id: row.data_model_id,
            user_id: row.user_id,
            pivot_on: row.pivot_on,
            error_message: row.error_message,
        })
    }
}

fn parse_json_column(
    text: Option<&str>,
    column: &str,
    job_id: &str,
) -> Result<Option<Value>, JobError> {
    text.map(|t| {
        serde_json::from_str(t).map_err(|e| {
            JobError::Serialization(format!("{} of job {}: {}", column, job_id, e))
        })
    })
    .transpose()
}

fn parse_timestamp(text: &str, job_id: &str) -> Result<DateTime<Utc>, JobError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobError::Serialization(format!("timestamp '{}' of job {}: {}", text, job_id, e)))
}

/// Input for creating a job. The job starts `queued`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExtraction {
    pub file_id: String,
    pub data_model_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_on: Option<String>,
}

impl NewExtraction {
    pub fn new(
        user_id: impl Into<String>,
        file_id: impl Into<String>,
        data_model_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            file_id: file_id.into(),
            data_model_id: data_model_id.into(),
            pivot_on: None,
        }
    }

    pub fn pivot_on(mut self, field: impl Into<String>) -> Self {
        self.pivot_on = Some(field.into());
        self
    }
}

/// Terminal result written by [`JobStore::finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed { error_message: Option<String> },
}

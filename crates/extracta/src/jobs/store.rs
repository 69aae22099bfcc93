//! Job persistence behind an async trait, backed by SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{ExtractionJob, JobError, JobOutcome, JobStatus, NewExtraction};
use crate::db::extraction_repo::{self, ExtractionRow};
use crate::db::{format_timestamp, now_timestamp, Database};

/// Durable job storage.
///
/// `try_transition` is the only guarded write: concurrent callers racing on
/// the same job see exactly one `true`. A lost race is not an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_extraction(&self, new: NewExtraction) -> Result<ExtractionJob, JobError>;

    async fn get_extraction(&self, id: &str) -> Result<Option<ExtractionJob>, JobError>;

    /// Newest first.
    async fn get_extractions_by_file(&self, file_id: &str)
        -> Result<Vec<ExtractionJob>, JobError>;

    async fn try_transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, JobError>;

    /// Unconditional terminal write.
    async fn finish(&self, id: &str, outcome: JobOutcome) -> Result<ExtractionJob, JobError>;

    async fn set_overrides(
        &self,
        id: &str,
        overrides: Option<Value>,
    ) -> Result<ExtractionJob, JobError>;

    /// Refreshes `updated_at` of a `processing` job so the reaper leaves it
    /// alone. `false` once the job has left `processing`.
    async fn heartbeat(&self, id: &str) -> Result<bool, JobError>;

    /// `processing` jobs last touched before `cutoff`.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExtractionJob>, JobError>;

    /// Moves a stale job back to `queued` if it is still `processing` and
    /// was not touched since `observed`.
    async fn requeue_if_unchanged(
        &self,
        id: &str,
        observed: DateTime<Utc>,
    ) -> Result<bool, JobError>;

    /// Fails a stale job if it is still `processing` and was not touched
    /// since `observed`.
    async fn fail_if_unchanged(
        &self,
        id: &str,
        observed: DateTime<Utc>,
        error_message: &str,
    ) -> Result<bool, JobError>;
}

/// [`JobStore`] over the `extractions` table. Every call runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, JobError>
    where
        F: FnOnce(&Database) -> Result<T, JobError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| JobError::Task(e.to_string()))?
    }
}

fn load(db: &Database, id: &str) -> Result<ExtractionJob, JobError> {
    extraction_repo::find_by_id(db, id)?
        .ok_or_else(|| JobError::NotFound(id.to_string()))
        .and_then(ExtractionJob::from_row)
}

fn to_json_text(value: &Value) -> Result<String, JobError> {
    serde_json::to_string(value).map_err(|e| JobError::Serialization(e.to_string()))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_extraction(&self, new: NewExtraction) -> Result<ExtractionJob, JobError> {
        self.blocking(move |db| {
            let now = now_timestamp();
            let row = ExtractionRow {
                id: uuid::Uuid::new_v4().to_string(),
                file_id: new.file_id,
                data_model_id: new.data_model_id,
                user_id: new.user_id,
                status: JobStatus::Queued.as_str().to_string(),
                pivot_on: new
                    .pivot_on
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
                data: None,
                overrides: None,
                error_message: None,
                created_at: now.clone(),
                updated_at: now,
            };
            extraction_repo::insert(db, &row)?;
            log::info!("Created extraction job {}", row.id);
            ExtractionJob::from_row(row)
        })
        .await
    }

    async fn get_extraction(&self, id: &str) -> Result<Option<ExtractionJob>, JobError> {
        let id = id.to_string();
        self.blocking(move |db| {
            extraction_repo::find_by_id(db, &id)?
                .map(ExtractionJob::from_row)
                .transpose()
        })
        .await
    }

    async fn get_extractions_by_file(
        &self,
        file_id: &str,
    ) -> Result<Vec<ExtractionJob>, JobError> {
        let file_id = file_id.to_string();
        self.blocking(move |db| {
            extraction_repo::find_by_file(db, &file_id)?
                .into_iter()
                .map(ExtractionJob::from_row)
                .collect()
        })
        .await
    }

    async fn try_transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool, JobError> {
        if !from.can_transition_to(to) {
            return Err(JobError::InvalidTransition { from, to });
        }
        let id = id.to_string();
        self.blocking(move |db| {
            let won = extraction_repo::transition_status(
                db,
                &id,
                from.as_str(),
                to.as_str(),
                &now_timestamp(),
            )?;
            Ok(won)
        })
        .await
    }

    async fn finish(&self, id: &str, outcome: JobOutcome) -> Result<ExtractionJob, JobError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let now = now_timestamp();
            let written = match &outcome {
                JobOutcome::Completed(data) => {
                    extraction_repo::mark_completed(db, &id, &to_json_text(data)?, &now)?
                }
                JobOutcome::Failed { error_message } => {
                    extraction_repo::mark_failed(db, &id, error_message.as_deref(), &now)?
                }
            };
            if !written {
                return Err(JobError::NotFound(id));
            }
            load(db, &id)
        })
        .await
    }

    async fn set_overrides(
        &self,
        id: &str,
        overrides: Option<Value>,
    ) -> Result<ExtractionJob, JobError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let text = overrides.as_ref().map(to_json_text).transpose()?;
            if !extraction_repo::set_overrides(db, &id, text.as_deref(), &now_timestamp())? {
                return Err(JobError::NotFound(id));
            }
            load(db, &id)
        })
        .await
    }

    async fn heartbeat(&self, id: &str) -> Result<bool, JobError> {
        let id = id.to_string();
        self.blocking(move |db| Ok(extraction_repo::touch_processing(db, &id, &now_timestamp())?))
            .await
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExtractionJob>, JobError> {
        self.blocking(move |db| {
            extraction_repo::find_stale(
                db,
                JobStatus::Processing.as_str(),
                &format_timestamp(cutoff),
            )?
            .into_iter()
            .map(ExtractionJob::from_row)
            .collect()
        })
        .await
    }

    async fn requeue_if_unchanged(
        &self,
        id: &str,
        observed: DateTime<Utc>,
    ) -> Result<bool, JobError> {
        let id = id.to_string();
        self.blocking(move |db| {
            Ok(extraction_repo::requeue_if_unchanged(
                db,
                &id,
                &format_timestamp(observed),
                &now_timestamp(),
            )?)
        })
        .await
    }

    async fn fail_if_unchanged(
        &self,
        id: &str,
        observed: DateTime<Utc>,
        error_message: &str,
    ) -> Result<bool, JobError> {
        let id = id.to_string();
        let error_message = error_message.to_string();
        self.blocking(move |db| {
            Ok(extraction_repo::fail_if_unchanged(
                db,
                &id,
                &format_timestamp(observed),
                &error_message,
                &now_timestamp(),
            )?)
        })
        .await
    }
}

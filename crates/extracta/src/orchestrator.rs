//! The run-extraction use case: claim a queued job, extract, and record
//! the outcome.
//!
//! Delivery is at-least-once, so the same job id can arrive many times.
//! Only the caller that wins the `queued -> processing` transition runs the
//! extraction; everyone else skips. While it runs, the winner refreshes the
//! job's `updated_at` so the stale-job reaper does not hand it to another
//! worker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::extraction::ExtractionError;
use crate::extractor::Extractor;
use crate::jobs::{JobError, JobOutcome, JobStatus, JobStore};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The extraction failed and the `failed` write did not go through
    /// either, so the job may still read `processing`.
    #[error("{source} (recording the failure also failed: {record})")]
    FailureNotRecorded {
        source: ExtractionError,
        record: JobError,
    },
}

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    /// Another delivery already moved the job out of `queued`.
    AlreadyClaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Skipped(SkipReason),
    Completed,
}

pub struct RunExtraction {
    jobs: Arc<dyn JobStore>,
    extractor: Arc<dyn Extractor>,
    heartbeat: Duration,
}

impl RunExtraction {
    pub fn new(jobs: Arc<dyn JobStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            jobs,
            extractor,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }

    /// Interval between `updated_at` refreshes while a job is extracting.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval.max(Duration::from_millis(1));
        self
    }

    /// Runs one job to a terminal state.
    ///
    /// On extraction failure the job is marked `failed` with the error text
    /// and the error is returned so the delivery can be retried or
    /// dead-lettered.
    pub async fn execute(&self, job_id: &str) -> Result<ExecuteOutcome, OrchestratorError> {
        self.run(job_id)
            .instrument(tracing::info_span!("extraction", job_id))
            .await
    }

    async fn run(&self, job_id: &str) -> Result<ExecuteOutcome, OrchestratorError> {
        let Some(job) = self.jobs.get_extraction(job_id).await? else {
            log::warn!("Extraction job {} not found, skipping", job_id);
            return Ok(ExecuteOutcome::Skipped(SkipReason::NotFound));
        };

        let claimed = self
            .jobs
            .try_transition(job_id, JobStatus::Queued, JobStatus::Processing)
            .await?;
        if !claimed {
            log::debug!(
                "Extraction job {} is {}, not queued; skipping",
                job_id,
                job.status
            );
            return Ok(ExecuteOutcome::Skipped(SkipReason::AlreadyClaimed));
        }

        log::info!(
            "Running {} extraction {}",
            if job.pivot_on.is_some() { "pivoted" } else { "basic" },
            job_id
        );

        let extraction = self.extractor.extract(
            &job.user_id,
            &job.file_id,
            &job.data_model_id,
            job.pivot_on.as_deref(),
        );
        let result = self.keep_alive(job_id, extraction).await;

        match result {
            Ok(data) => {
                self.jobs
                    .finish(job_id, JobOutcome::Completed(data))
                    .await?;
                log::info!("Extraction job {} completed", job_id);
                Ok(ExecuteOutcome::Completed)
            }
            Err(err) => {
                log::error!("Extraction job {} failed: {}", job_id, err);
                let outcome = JobOutcome::Failed {
                    error_message: Some(err.to_string()),
                };
                if let Err(record) = self.jobs.finish(job_id, outcome).await {
                    log::error!(
                        "Could not mark extraction job {} failed: {}",
                        job_id,
                        record
                    );
                    return Err(OrchestratorError::FailureNotRecorded {
                        source: err,
                        record,
                    });
                }
                Err(err.into())
            }
        }
    }

    /// Drives `work` to completion, refreshing the job's `updated_at` on
    /// every heartbeat tick. Heartbeat failures are logged, never fatal.
    async fn keep_alive<F, T>(&self, job_id: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        tokio::pin!(work);
        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; the claim just set updated_at
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                output = &mut work => return output,
                _ = ticker.tick() => match self.jobs.heartbeat(job_id).await {
                    Ok(true) => log::trace!("Heartbeat for extraction job {}", job_id),
                    Ok(false) => log::warn!(
                        "Extraction job {} left processing while still running",
                        job_id
                    ),
                    Err(e) => log::warn!("Heartbeat for extraction job {} failed: {}", job_id, e),
                },
            }
        }
    }
}

//! Recovery of jobs stuck in `processing` after a worker died mid-run.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{JobError, JobStore};

pub const TIMEOUT_ERROR_MESSAGE: &str = "extraction timed out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperAction {
    /// Back to `queued`; the caller re-publishes the returned ids.
    Requeue,
    /// Terminal `failed` with [`TIMEOUT_ERROR_MESSAGE`].
    Fail,
}

/// Reaps `processing` jobs not updated within `older_than`.
pub async fn reap_stale(
    store: &dyn JobStore,
    older_than: Duration,
    action: ReaperAction,
) -> Result<Vec<String>, JobError> {
    let now = Utc::now();
    let cutoff = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    reap_before(store, cutoff, action).await
}

/// Reaps `processing` jobs last updated before `cutoff`. Returns the ids
/// this call actually changed; jobs that moved on since they were read are
/// left alone.
pub async fn reap_before(
    store: &dyn JobStore,
    cutoff: DateTime<Utc>,
    action: ReaperAction,
) -> Result<Vec<String>, JobError> {
    let stale = store.find_stale(cutoff).await?;
    let mut reaped = Vec::with_capacity(stale.len());

    for job in stale {
        let changed = match action {
            ReaperAction::Requeue => store.requeue_if_unchanged(&job.id, job.updated_at).await?,
            ReaperAction::Fail => {
                store
                    .fail_if_unchanged(&job.id, job.updated_at, TIMEOUT_ERROR_MESSAGE)
                    .await?
            }
        };
        if changed {
            log::warn!(
                "Reaped stale extraction {} ({:?}, last update {})",
                job.id,
                action,
                job.updated_at
            );
            reaped.push(job.id);
        } else {
            log::debug!("Stale extraction {} changed before it was reaped", job.id);
        }
    }

    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::{JobOutcome, JobStatus, NewExtraction, SqliteJobStore};

    async fn processing_job(store: &SqliteJobStore) -> String {
        let job = store
            .create_extraction(NewExtraction::new("u", "f", "m"))
            .await
            .unwrap();
        assert!(store
            .try_transition(&job.id, JobStatus::Queued, JobStatus::Processing)
            .await
            .unwrap());
        job.id
    }

    fn future_cutoff() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_requeue_stale_processing() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        let stuck = processing_job(&store).await;
        let queued = store
            .create_extraction(NewExtraction::new("u", "f", "m"))
            .await
            .unwrap();

        let reaped = reap_before(&store, future_cutoff(), ReaperAction::Requeue)
            .await
            .unwrap();
        assert_eq!(reaped, vec![stuck.clone()]);

        let job = store.get_extraction(&stuck).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error_message.is_none());
        let untouched = store.get_extraction(&queued.id).await.unwrap().unwrap();
        assert_eq!(untouched, queued);
    }

    #[tokio::test]
    async fn test_fail_stale_processing() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        let stuck = processing_job(&store).await;

        let reaped = reap_before(&store, future_cutoff(), ReaperAction::Fail)
            .await
            .unwrap();
        assert_eq!(reaped, vec![stuck.clone()]);

        let job = store.get_extraction(&stuck).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(TIMEOUT_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_fresh_and_finished_jobs_ignored() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        let fresh = processing_job(&store).await;
        let done = processing_job(&store).await;
        store
            .finish(&done, JobOutcome::Completed(serde_json::json!({})))
            .await
            .unwrap();

        let reaped = reap_stale(&store, Duration::from_secs(3600), ReaperAction::Fail)
            .await
            .unwrap();
        assert!(reaped.is_empty());
        let job = store.get_extraction(&fresh).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        let reaped = reap_before(&store, future_cutoff(), ReaperAction::Fail)
            .await
            .unwrap();
        assert_eq!(reaped, vec![fresh]);
    }

    #[tokio::test]
    async fn test_huge_age_does_not_overflow() {
        let store = SqliteJobStore::new(Database::open_in_memory().unwrap());
        processing_job(&store).await;
        let reaped = reap_stale(&store, Duration::MAX, ReaperAction::Requeue)
            .await
            .unwrap();
        assert!(reaped.is_empty());
    }
}

//! Batch consumer for job-id messages with partial-failure reporting.
//!
//! Messages whose ids come back in `batchItemFailures` are redelivered by
//! the queue; everything else is acknowledged.

use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::concurrency::run_bounded;
use crate::orchestrator::{ExecuteOutcome, RunExtraction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub message_id: String,
    /// `{"jobId": "..."}` or a bare job id.
    pub body: String,
}

impl QueueMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn failed_ids(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect()
    }
}

/// Reads the job id out of a message body.
pub fn parse_job_id(body: &str) -> Option<String> {
    let body = body.trim();
    if body.starts_with(['{', '[', '"']) {
        let id = match serde_json::from_str::<Value>(body).ok()? {
            Value::Object(map) => map.get("jobId")?.as_str()?.trim().to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return None,
        };
        return (!id.is_empty()).then_some(id);
    }
    if body.is_empty() || body.chars().any(char::is_whitespace) {
        return None;
    }
    Some(body.to_string())
}

pub struct QueueConsumer {
    orchestrator: Arc<RunExtraction>,
    concurrency: usize,
}

impl QueueConsumer {
    pub fn new(orchestrator: Arc<RunExtraction>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// Executes every message of the batch, at most `concurrency` at a time,
    /// and reports the ones that should be redelivered.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchResponse {
        let results = run_bounded(
            messages.into_iter().enumerate(),
            self.concurrency,
            |(index, message)| async move {
                Ok::<_, Infallible>((index, message.message_id.clone(), self.handle(&message).await))
            },
        )
        .await;

        let mut failed: Vec<(usize, String)> = match results {
            Ok(results) => results
                .into_iter()
                .filter(|(_, _, ok)| !ok)
                .map(|(index, id, _)| (index, id))
                .collect(),
            Err(never) => match never {},
        };
        failed.sort_by_key(|(index, _)| *index);

        BatchResponse {
            batch_item_failures: failed
                .into_iter()
                .map(|(_, item_identifier)| BatchItemFailure { item_identifier })
                .collect(),
        }
    }

    /// True when the message can be acknowledged.
    async fn handle(&self, message: &QueueMessage) -> bool {
        let Some(job_id) = parse_job_id(&message.body) else {
            log::error!("Message {} has no job id, reporting failure", message.message_id);
            return false;
        };

        match self.orchestrator.execute(&job_id).await {
            Ok(ExecuteOutcome::Completed) | Ok(ExecuteOutcome::Skipped(_)) => true,
            Err(e) => {
                log::warn!(
                    "Message {} (job {}) failed and will be redelivered: {}",
                    message.message_id,
                    job_id,
                    e
                );
                false
            }
        }
    }
}

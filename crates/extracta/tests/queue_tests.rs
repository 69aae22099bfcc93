//! Queue batches: partial failure reporting and redelivery.

mod common;

use common::{object_schema, ScriptedModel, TestHarness};
use extracta::jobs::JobStatus;
use extracta::queue::QueueMessage;
use serde_json::json;

async fn harness_with_inputs() -> TestHarness {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({
        "title": {"answer": "Report", "rationale": "heading"}
    })));
    h.add_file("f-1", "report.txt", "text/plain", b"Report").await;
    h.add_data_model("m-1", &object_schema(&[("title", "string")])).await;
    h
}

#[tokio::test]
async fn test_successful_batch_reports_no_failures() {
    let h = harness_with_inputs().await;
    let a = h.queue_job("f-1", "m-1", None).await;
    let b = h.queue_job("f-1", "m-1", None).await;

    let response = h
        .consumer(2)
        .process_batch(vec![
            QueueMessage::new("msg-a", json!({"jobId": a.id}).to_string()),
            QueueMessage::new("msg-b", b.id.clone()),
        ])
        .await;

    assert!(response.batch_item_failures.is_empty());
    assert_eq!(h.job(&a.id).await.status, JobStatus::Completed);
    assert_eq!(h.job(&b.id).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_partial_failure_lists_only_failed_messages() {
    let h = harness_with_inputs().await;
    let good = h.queue_job("f-1", "m-1", None).await;
    let bad = h.queue_job("f-gone", "m-1", None).await;
    let also_good = h.queue_job("f-1", "m-1", None).await;

    let response = h
        .consumer(3)
        .process_batch(vec![
            QueueMessage::new("m1", json!({"jobId": good.id}).to_string()),
            QueueMessage::new("m2", json!({"jobId": bad.id}).to_string()),
            QueueMessage::new("m3", "not a job id"),
            QueueMessage::new("m4", json!({"jobId": also_good.id}).to_string()),
        ])
        .await;

    assert_eq!(response.failed_ids(), vec!["m2", "m3"]);
    assert_eq!(h.job(&good.id).await.status, JobStatus::Completed);
    assert_eq!(h.job(&also_good.id).await.status, JobStatus::Completed);

    let failed = h.job(&bad.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("File 'f-gone' not found"));
}

#[tokio::test]
async fn test_redelivered_batch_is_acknowledged() {
    let h = harness_with_inputs().await;
    let job = h.queue_job("f-1", "m-1", None).await;
    let consumer = h.consumer(4);
    let message = || QueueMessage::new("msg", json!({"jobId": job.id}).to_string());

    assert!(consumer.process_batch(vec![message()]).await.batch_item_failures.is_empty());
    // duplicates inside one batch and across batches are both skips
    let response = consumer.process_batch(vec![message(), message()]).await;
    assert!(response.batch_item_failures.is_empty());
    assert_eq!(h.model.requests().len(), 1);
}

#[tokio::test]
async fn test_message_for_unknown_job_is_acknowledged() {
    let h = harness_with_inputs().await;
    let response = h
        .consumer(1)
        .process_batch(vec![QueueMessage::new("m1", json!({"jobId": "ghost"}).to_string())])
        .await;
    assert!(response.batch_item_failures.is_empty());
}

#[tokio::test]
async fn test_response_wire_format() {
    let h = harness_with_inputs().await;
    let response = h
        .consumer(1)
        .process_batch(vec![QueueMessage::new("m-bad", "{}")])
        .await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"batchItemFailures": [{"itemIdentifier": "m-bad"}]})
    );
}

#[tokio::test]
async fn test_empty_batch() {
    let h = TestHarness::new();
    let response = h.consumer(2).process_batch(Vec::new()).await;
    assert!(response.batch_item_failures.is_empty());
}

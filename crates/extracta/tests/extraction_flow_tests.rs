//! End-to-end job execution: catalog lookup, blob download, loading,
//! model calls and the persisted job record.

mod common;

use common::{csv_bytes, docx_bytes, object_schema, ScriptedModel, TestHarness, DOCX_MIME};
use extracta::jobs::JobStatus;
use extracta::model::RequestPurpose;
use extracta::orchestrator::{ExecuteOutcome, OrchestratorError, SkipReason};
use serde_json::json;

fn invoice_schema() -> serde_json::Value {
    object_schema(&[("vendor", "string"), ("total", "number")])
}

// ─── Basic extraction ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_basic_job_completes_with_model_output() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({
        "vendor": {"answer": "Acme", "rationale": "letterhead"},
        "total": {"answer": 120.5, "rationale": "Total due line"}
    })));
    h.add_file("f-1", "invoice.txt", "text/plain", b"Acme Corp\nTotal due: 120.50")
        .await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;
    assert_eq!(job.status, JobStatus::Queued);

    let outcome = h.run_extraction().execute(&job.id).await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    let data = stored.data.unwrap();
    assert_eq!(data["vendor"]["answer"], json!("Acme"));
    assert_eq!(data["total"]["answer"], json!(120.5));
    assert!(stored.error_message.is_none());
    assert!(stored.updated_at >= stored.created_at);
}

#[tokio::test]
async fn test_model_sees_document_text_and_evidence_schema() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({})));
    h.add_file("f-1", "notes.docx", DOCX_MIME, &docx_bytes(&["Vendor: Globex", "Total: 99"]))
        .await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;

    h.run_extraction().execute(&job.id).await.unwrap();

    let requests = h.model.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.purpose, RequestPurpose::Extraction);
    assert!(request.prompt.contains("Vendor: Globex"));
    // every property is wrapped as {answer, rationale}
    let vendor = &request.schema["properties"]["vendor"];
    assert_eq!(vendor["properties"]["answer"]["type"], json!("string"));
    assert!(vendor["properties"].get("rationale").is_some());
}

#[tokio::test]
async fn test_octet_stream_csv_is_loaded_by_extension() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({})));
    let body = csv_bytes(&[&["region", "revenue"], &["North", "10"], &["South", "20"]]);
    h.add_file("f-1", "sales.csv", "application/octet-stream", &body).await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;

    h.run_extraction().execute(&job.id).await.unwrap();

    let prompt = &h.model.requests()[0].prompt;
    assert!(prompt.contains("| region | revenue |"));
    assert!(prompt.contains("| South | 20 |"));
}

#[tokio::test]
async fn test_csv_without_extension_is_loaded_as_table() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({})));
    let body = csv_bytes(&[&["region", "revenue"], &["East", "7"]]);
    h.add_file("f-1", "export", "text/csv", &body).await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;

    let outcome = h.run_extraction().execute(&job.id).await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let prompt = &h.model.requests()[0].prompt;
    assert!(prompt.contains("# Sheet1"));
    assert!(prompt.contains("| East | 7 |"));
}

// ─── Pivoted extraction ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pivot_job_stores_one_row_per_key() {
    let h = TestHarness::with_model(ScriptedModel::new().pivot_keys("region", &["North", "South", "East"]));
    h.add_file("f-1", "sales.txt", "text/plain", b"North 10, South 20, East 5")
        .await;
    h.add_data_model("m-1", &object_schema(&[("region", "string"), ("revenue", "number")]))
        .await;
    let job = h.queue_job("f-1", "m-1", Some("region")).await;

    h.run_extraction().execute(&job.id).await.unwrap();

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    let data = stored.data.unwrap();
    let rows = data["rows"].as_array().unwrap();
    let regions: Vec<&str> = rows
        .iter()
        .map(|r| r["region"]["answer"].as_str().unwrap())
        .collect();
    assert_eq!(regions, vec!["North", "South", "East"]);

    assert_eq!(h.model.count(|p| *p == RequestPurpose::PivotKeys), 1);
    assert_eq!(
        h.model.count(|p| matches!(p, RequestPurpose::PivotRow { .. })),
        3
    );
}

#[tokio::test]
async fn test_pivot_without_keys_completes_empty() {
    let h = TestHarness::with_model(ScriptedModel::new().pivot_keys("region", &[]));
    h.add_file("f-1", "sales.txt", "text/plain", b"nothing here").await;
    h.add_data_model("m-1", &object_schema(&[("region", "string")])).await;
    let job = h.queue_job("f-1", "m-1", Some("region")).await;

    h.run_extraction().execute(&job.id).await.unwrap();

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.data, Some(json!({"rows": []})));
}

#[tokio::test]
async fn test_failed_pivot_row_fails_whole_job() {
    let h = TestHarness::with_model(
        ScriptedModel::new()
            .pivot_keys("region", &["North", "South"])
            .refuse_row("South"),
    );
    h.add_file("f-1", "sales.txt", "text/plain", b"North, South").await;
    h.add_data_model("m-1", &object_schema(&[("region", "string")])).await;
    let job = h.queue_job("f-1", "m-1", Some("region")).await;

    let err = h.run_extraction().execute(&job.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Extraction(_)));

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.data.is_none());
    assert!(stored.error_message.unwrap().contains("row South"));
}

#[tokio::test]
async fn test_unknown_pivot_field_fails_job() {
    let h = TestHarness::new();
    h.add_file("f-1", "sales.txt", "text/plain", b"North").await;
    h.add_data_model("m-1", &object_schema(&[("region", "string")])).await;
    let job = h.queue_job("f-1", "m-1", Some("country")).await;

    assert!(h.run_extraction().execute(&job.id).await.is_err());

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Pivot field 'country' is not a property of the target schema")
    );
    assert!(h.model.requests().is_empty());
}

// ─── Delivery semantics ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_redelivered_job_is_not_extracted_twice() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({})));
    h.add_file("f-1", "a.txt", "text/plain", b"text").await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;
    let run = h.run_extraction();

    assert_eq!(run.execute(&job.id).await.unwrap(), ExecuteOutcome::Completed);
    let first = h.job(&job.id).await;

    assert_eq!(
        run.execute(&job.id).await.unwrap(),
        ExecuteOutcome::Skipped(SkipReason::AlreadyClaimed)
    );
    assert_eq!(h.model.requests().len(), 1);
    assert_eq!(h.job(&job.id).await, first);
}

#[tokio::test]
async fn test_concurrent_deliveries_call_model_once() {
    let h = TestHarness::with_model(ScriptedModel::new().extraction_reply(json!({})));
    h.add_file("f-1", "a.txt", "text/plain", b"text").await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;
    let run = h.run_extraction();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let run = run.clone();
            let id = job.id.clone();
            tokio::spawn(async move { run.execute(&id).await.unwrap() })
        })
        .collect();
    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap() == ExecuteOutcome::Completed {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(h.model.requests().len(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_skipped() {
    let h = TestHarness::new();
    assert_eq!(
        h.run_extraction().execute("no-such-job").await.unwrap(),
        ExecuteOutcome::Skipped(SkipReason::NotFound)
    );
}

// ─── Failures ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_file_is_recorded_on_job() {
    let h = TestHarness::new();
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-missing", "m-1", None).await;

    assert!(h.run_extraction().execute(&job.id).await.is_err());

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("File 'f-missing' not found"));
    assert!(h.model.requests().is_empty());
}

#[tokio::test]
async fn test_missing_data_model_is_recorded_on_job() {
    let h = TestHarness::new();
    h.add_file("f-1", "a.txt", "text/plain", b"text").await;
    let job = h.queue_job("f-1", "m-missing", None).await;

    assert!(h.run_extraction().execute(&job.id).await.is_err());

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Data model 'm-missing' not found")
    );
}

#[tokio::test]
async fn test_empty_file_fails_before_model_call() {
    let h = TestHarness::new();
    h.add_file("f-1", "empty.txt", "text/plain", b"").await;
    h.add_data_model("m-1", &invoice_schema()).await;
    let job = h.queue_job("f-1", "m-1", None).await;

    assert!(h.run_extraction().execute(&job.id).await.is_err());

    let stored = h.job(&job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.is_some());
    assert!(h.model.requests().is_empty());
}

#[tokio::test]
async fn test_failed_job_is_not_retried_on_redelivery() {
    let h = TestHarness::new();
    let job = h.queue_job("f-missing", "m-missing", None).await;
    let run = h.run_extraction();

    assert!(run.execute(&job.id).await.is_err());
    assert_eq!(
        run.execute(&job.id).await.unwrap(),
        ExecuteOutcome::Skipped(SkipReason::AlreadyClaimed)
    );
    assert_eq!(h.job(&job.id).await.status, JobStatus::Failed);
}

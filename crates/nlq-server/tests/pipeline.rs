//! Orchestrator behaviour over in-memory DuckDB with scripted drafts

mod common;

use common::*;
use nlq_ir::{
    AuditLog, CancellationToken, DraftError, MemoryAuditLog, QueryDraft, RequestContext,
};
use nlq_server::{Outcome, PipelineMetrics, QueryPipeline};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    pipeline: QueryPipeline,
    audit: Arc<MemoryAuditLog>,
    storage: Arc<Counting>,
    metrics: PipelineMetrics,
}

fn harness(drafts: Scripted) -> Harness {
    harness_with(drafts, query_config())
}

fn harness_with(drafts: Scripted, config: nlq_server::config::QueryConfig) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let storage = Arc::new(Counting::new(seeded_store()));
    let metrics = PipelineMetrics::new().unwrap();
    let pipeline = QueryPipeline::new(
        Arc::new(drafts),
        storage.clone(),
        audit.clone(),
        metrics.clone(),
        &config,
    );
    Harness {
        pipeline,
        audit,
        storage,
        metrics,
    }
}

#[tokio::test]
async fn test_compliance_by_department_end_to_end() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    let response = h
        .pipeline
        .process("show compliance by department", &full_access(), &CancellationToken::new())
        .await;

    assert!(response.success, "error: {:?}", response.error);
    assert_eq!(response.columns, vec!["DepartmentName", "ValidCount", "InvalidCount"]);
    assert_eq!(response.total_rows, 2);
    assert!(!response.was_truncated);
    assert_eq!(response.rows[0]["DepartmentName"], json!("Alpha"));
    assert_eq!(response.rows[0]["ValidCount"], json!(2));
    assert_eq!(response.rows[0]["InvalidCount"], json!(1));
    assert_eq!(response.rows[1]["DepartmentName"], json!("Beta"));
    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("Consider limiting results")));
    assert!(response
        .generated_sql
        .as_deref()
        .is_some_and(|sql| sql.ends_with("LIMIT 1000")));
    assert_eq!(
        response.explanation.as_deref(),
        Some("Valid and invalid audits per department")
    );

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.success);
    assert_eq!(record.result_count, 2);
    assert_eq!(record.identity_id, MANAGER);
    assert_eq!(record.tenant_id, TENANT);
    assert_eq!(record.elapsed_ms, response.elapsed_ms);
    assert_eq!(record.generated_sql, response.generated_sql);
    assert_eq!(h.metrics.count(Outcome::Success), 1);
}

#[tokio::test]
async fn test_other_tenant_sees_only_its_rows() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    let context = RequestContext::new(OTHER_TENANT)
        .with_identity(Uuid::new_v4())
        .with_full_scope_access();
    let response = h
        .pipeline
        .process("show compliance by department", &context, &CancellationToken::new())
        .await;

    assert!(response.success);
    assert_eq!(response.total_rows, 1);
    assert_eq!(response.rows[0]["DepartmentName"], json!("Gamma"));
    assert_eq!(response.rows[0]["InvalidCount"], json!(5));
}

#[tokio::test]
async fn test_empty_scope_never_executes() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    let context = RequestContext::new(TENANT).with_identity(MANAGER);
    let response = h
        .pipeline
        .process("show compliance by department", &context, &CancellationToken::new())
        .await;

    assert!(response.success);
    assert_eq!(response.total_rows, 0);
    assert!(response.rows.is_empty());
    assert_eq!(h.storage.calls(), 0);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].result_count, 0);
    assert_eq!(h.metrics.count(Outcome::EmptyScope), 1);
}

#[tokio::test]
async fn test_rejection_is_audited_with_draft_sql() {
    let h = harness(Scripted::sql("DROP TABLE Users"));
    let response = h
        .pipeline
        .process("remove everyone", &full_access(), &CancellationToken::new())
        .await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.contains("DROP"));
    assert_eq!(h.storage.calls(), 0);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].generated_sql.as_deref(), Some("DROP TABLE Users"));
    assert_eq!(records[0].error_message.as_deref(), Some(error.as_str()));
    assert_eq!(h.metrics.count(Outcome::Rejected), 1);
}

#[tokio::test]
async fn test_clarification_is_not_audited() {
    let h = harness(Scripted::new(|| {
        Ok(QueryDraft::Clarification {
            message: "Which month do you mean?".to_string(),
        })
    }));
    let response = h
        .pipeline
        .process("audits for the month", &full_access(), &CancellationToken::new())
        .await;

    assert!(!response.success);
    assert!(response.clarification_needed);
    assert_eq!(
        response.clarification_message.as_deref(),
        Some("Which month do you mean?")
    );
    assert!(response.error.is_none());
    assert!(h.audit.records().is_empty());
    assert_eq!(h.metrics.count(Outcome::Clarification), 1);
}

#[tokio::test]
async fn test_draft_source_error_is_audited_generically() {
    let h = harness(Scripted::new(|| {
        Err(DraftError::Unavailable("connection refused to 10.0.0.5".to_string()))
    }));
    let response = h
        .pipeline
        .process("show compliance", &full_access(), &CancellationToken::new())
        .await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(!error.contains("10.0.0.5"));

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].generated_sql.is_none());
    assert!(records[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("connection refused")));
    assert_eq!(h.metrics.count(Outcome::DraftFailed), 1);
}

#[tokio::test]
async fn test_execution_failure_hides_engine_detail() {
    let h = harness(Scripted::sql(
        "SELECT MissingColumn FROM Departments WHERE OrganisationId = @TenantId",
    ));
    let response = h
        .pipeline
        .process("show departments", &full_access(), &CancellationToken::new())
        .await;

    assert!(!response.success);
    assert!(!response.error.unwrap().contains("MissingColumn"));

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert!(records[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("MissingColumn")));
    assert_eq!(h.metrics.count(Outcome::ExecutionFailed), 1);
}

#[tokio::test]
async fn test_preview_off_strips_sql_but_audits_it() {
    let mut config = query_config();
    config.enable_sql_preview = false;
    let h = harness_with(Scripted::sql(COMPLIANCE_SQL), config);

    let response = h
        .pipeline
        .process("show compliance by department", &full_access(), &CancellationToken::new())
        .await;

    assert!(response.success);
    assert!(response.generated_sql.is_none());
    assert!(h.audit.records()[0].generated_sql.is_some());
}

#[tokio::test]
async fn test_history_disabled_writes_nothing() {
    let mut config = query_config();
    config.enable_query_history = false;
    let h = harness_with(Scripted::sql(COMPLIANCE_SQL), config);

    h.pipeline
        .process("show compliance by department", &full_access(), &CancellationToken::new())
        .await;
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn test_history_is_clamped() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    for _ in 0..3 {
        h.pipeline
            .process("show compliance by department", &full_access(), &CancellationToken::new())
            .await;
    }

    assert_eq!(h.pipeline.history(&full_access(), Some(0)).await.unwrap().len(), 1);
    assert_eq!(h.pipeline.history(&full_access(), None).await.unwrap().len(), 3);
    assert_eq!(h.audit.history(MANAGER, 500).await.unwrap().len(), 3);

    let stranger = RequestContext::new(TENANT).with_identity(Uuid::new_v4());
    assert!(h.pipeline.history(&stranger, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_csv() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    let csv = h
        .pipeline
        .export_csv("show compliance by department", &full_access(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "DepartmentName,ValidCount,InvalidCount\r\nAlpha,2,1\r\nBeta,1,0\r\n"
    );
}

#[tokio::test]
async fn test_export_join_with_repeated_column_names() {
    let h = harness(Scripted::sql(
        "SELECT d.Name, o.Name FROM Departments d \
         JOIN Organisations o ON o.Id = d.OrganisationId \
         WHERE d.OrganisationId = @TenantId ORDER BY d.Name",
    ));
    let csv = h
        .pipeline
        .export_csv("departments with their organisation", &full_access(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "Name,Name_2\r\nAlpha,Acme\r\nBeta,Acme\r\n"
    );
}

#[tokio::test]
async fn test_export_of_rejected_query_fails() {
    let h = harness(Scripted::sql("DELETE FROM Users"));
    let err = h
        .pipeline
        .export_csv("delete users", &full_access(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("DELETE"));
}

#[test]
fn test_default_suggestions() {
    let h = harness(Scripted::sql(COMPLIANCE_SQL));
    assert_eq!(h.pipeline.suggestions().len(), 10);
}

//! Pipeline orchestrator: draft, validate, rewrite, execute, audit
//!
//! Every request resolves to exactly one [`QueryResponse`]. Elapsed time is
//! taken once in [`QueryPipeline::finish`] and shared by the response, the
//! audit record and the latency histogram.

use chrono::Utc;
use nlq_duck::{ExecutionBudget, ExecutionError, QueryExecutor};
use nlq_guard::{AccessRewriter, Rewrite, SqlValidator};
use nlq_ir::{
    AuditError, AuditLog, AuditRecord, CancellationToken, DraftError, DraftSource, QueryDraft,
    RequestContext, Row, Storage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::QueryConfig;
use crate::export::{to_csv, ExportError};
use crate::metrics::{Outcome, PipelineMetrics};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;

const CLARIFICATION_FALLBACK: &str = "Could not generate SQL. Please provide more details.";
const DRAFT_UNAVAILABLE: &str =
    "The query service is currently unavailable. Please try again later.";
const REQUEST_CANCELLED: &str = "The request was cancelled.";
const EXECUTION_TIMEOUT: &str =
    "The query took too long to run. Try narrowing it to a shorter period or fewer departments.";
const EXECUTION_FAILED: &str =
    "The query could not be executed. Please try rephrasing your question.";
const NO_VISIBLE_SCOPE: &str =
    "You do not have access to any departments, so no data is visible.";

const DEFAULT_SUGGESTIONS: &[&str] = &[
    "Show compliance by department",
    "How many valid and invalid audits were recorded this month?",
    "Which departments have the most invalid audits?",
    "Show monthly audit counts for the last 6 months",
    "List users with no audits in the last 30 days",
    "What percentage of audits were valid last month?",
    "Show the top 10 users by number of audits",
    "How many users are in each department?",
    "Compare valid audits between this month and last month",
    "List reports generated this week",
];

/// Caller-facing result of one natural-language query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub natural_language_query: String,
    pub generated_sql: Option<String>,
    pub explanation: Option<String>,
    pub warnings: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total_rows: usize,
    pub was_truncated: bool,
    pub elapsed_ms: f64,
    pub clarification_needed: bool,
    pub clarification_message: Option<String>,
    pub error: Option<String>,
}

impl QueryResponse {
    fn for_query(query: &str) -> Self {
        Self {
            natural_language_query: query.to_string(),
            ..Default::default()
        }
    }

    fn failed(query: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_query(query)
        }
    }
}

/// What to persist for an attempt. `None` means the attempt is not audited.
struct AuditEntry {
    generated_sql: Option<String>,
    error_message: Option<String>,
}

pub struct QueryPipeline {
    drafts: Arc<dyn DraftSource>,
    executor: QueryExecutor,
    audit: Arc<dyn AuditLog>,
    metrics: PipelineMetrics,
    validator: SqlValidator,
    rewriter: AccessRewriter,
    enable_history: bool,
    enable_sql_preview: bool,
    suggestions: Vec<String>,
}

impl QueryPipeline {
    pub fn new(
        drafts: Arc<dyn DraftSource>,
        storage: Arc<dyn Storage>,
        audit: Arc<dyn AuditLog>,
        metrics: PipelineMetrics,
        config: &QueryConfig,
    ) -> Self {
        let budget = ExecutionBudget {
            timeout: config.timeout(),
            max_rows: config.max_result_rows,
        };

        let suggestions = config.suggestions.clone().unwrap_or_else(|| {
            DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        });

        Self {
            drafts,
            executor: QueryExecutor::new(storage, budget),
            audit,
            metrics,
            validator: SqlValidator::new(config.policy.clone()),
            rewriter: AccessRewriter::new(config.row_cap_style, config.default_row_cap),
            enable_history: config.enable_query_history,
            enable_sql_preview: config.enable_sql_preview,
            suggestions,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Run one natural-language query for `context`.
    pub async fn process(
        &self,
        query: &str,
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let started = Instant::now();
        tracing::info!(
            query,
            tenant = %context.tenant_id,
            identity = ?context.identity_id,
            "Processing natural-language query"
        );

        let draft = match self.drafts.generate_draft(query, context, cancel).await {
            Ok(QueryDraft::Sql(draft)) => draft,
            Ok(QueryDraft::Clarification { message }) => {
                let message = if message.trim().is_empty() {
                    CLARIFICATION_FALLBACK.to_string()
                } else {
                    message
                };
                let response = QueryResponse {
                    clarification_needed: true,
                    clarification_message: Some(message),
                    ..QueryResponse::for_query(query)
                };
                return self
                    .finish(started, context, Outcome::Clarification, response, None)
                    .await;
            }
            Ok(QueryDraft::Failed { error }) => {
                let entry = AuditEntry {
                    generated_sql: None,
                    error_message: Some(error.clone()),
                };
                let response = QueryResponse::failed(query, error);
                return self
                    .finish(started, context, Outcome::DraftFailed, response, Some(entry))
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Draft generation failed");
                let caller_message = match &e {
                    DraftError::Cancelled => REQUEST_CANCELLED,
                    DraftError::Unavailable(_) => DRAFT_UNAVAILABLE,
                };
                let entry = AuditEntry {
                    generated_sql: None,
                    error_message: Some(e.to_string()),
                };
                let response = QueryResponse::failed(query, caller_message);
                return self
                    .finish(started, context, Outcome::DraftFailed, response, Some(entry))
                    .await;
            }
        };

        tracing::debug!(sql = %draft.sql, "Draft received");

        let validated = match self.validator.accept(&draft.sql) {
            Ok(validated) => validated,
            Err(rejection) => {
                let error = rejection
                    .error_message
                    .unwrap_or_else(|| "Query failed validation.".to_string());
                tracing::warn!(error = %error, "Draft rejected");
                let entry = AuditEntry {
                    generated_sql: Some(draft.sql.clone()),
                    error_message: Some(error.clone()),
                };
                let response = QueryResponse {
                    generated_sql: Some(draft.sql),
                    explanation: non_empty(draft.explanation),
                    warnings: merge_warnings(rejection.warnings, draft.warnings),
                    ..QueryResponse::failed(query, error)
                };
                return self
                    .finish(started, context, Outcome::Rejected, response, Some(entry))
                    .await;
            }
        };

        let plan = match self.rewriter.rewrite(validated, &draft.parameters, context) {
            Rewrite::Plan(plan) => plan,
            Rewrite::EmptyScope { sql, warnings } => {
                tracing::info!(tenant = %context.tenant_id, "Caller has no visible scope");
                let mut warnings = merge_warnings(warnings, draft.warnings);
                warnings.push(NO_VISIBLE_SCOPE.to_string());
                let entry = AuditEntry {
                    generated_sql: Some(sql.clone()),
                    error_message: None,
                };
                let response = QueryResponse {
                    success: true,
                    generated_sql: Some(sql),
                    explanation: non_empty(draft.explanation),
                    warnings,
                    ..QueryResponse::for_query(query)
                };
                return self
                    .finish(started, context, Outcome::EmptyScope, response, Some(entry))
                    .await;
            }
        };

        tracing::debug!(sql = plan.sql(), fingerprint = %plan.fingerprint(), "Executing plan");
        let warnings = merge_warnings(plan.warnings().to_vec(), draft.warnings);

        match self.executor.execute(&plan, cancel).await {
            Ok(result) => {
                let mut warnings = warnings;
                if result.was_truncated {
                    warnings.push(format!(
                        "Showing the first {} of {} rows.",
                        result.rows.len(),
                        result.total_row_count
                    ));
                }
                let entry = AuditEntry {
                    generated_sql: Some(plan.sql().to_string()),
                    error_message: None,
                };
                let response = QueryResponse {
                    success: true,
                    generated_sql: Some(plan.sql().to_string()),
                    explanation: non_empty(draft.explanation),
                    warnings,
                    columns: result.columns,
                    rows: result.rows,
                    total_rows: result.total_row_count,
                    was_truncated: result.was_truncated,
                    ..QueryResponse::for_query(query)
                };
                self.finish(started, context, Outcome::Success, response, Some(entry))
                    .await
            }
            Err(e) => {
                tracing::error!(error = %e, fingerprint = %plan.fingerprint(), "Execution failed");
                let caller_message = execution_message(&e);
                let entry = AuditEntry {
                    generated_sql: Some(plan.sql().to_string()),
                    error_message: Some(e.to_string()),
                };
                let response = QueryResponse {
                    generated_sql: Some(plan.sql().to_string()),
                    explanation: non_empty(draft.explanation),
                    warnings,
                    ..QueryResponse::failed(query, caller_message)
                };
                self.finish(started, context, Outcome::ExecutionFailed, response, Some(entry))
                    .await
            }
        }
    }

    async fn finish(
        &self,
        started: Instant,
        context: &RequestContext,
        outcome: Outcome,
        mut response: QueryResponse,
        entry: Option<AuditEntry>,
    ) -> QueryResponse {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        response.elapsed_ms = elapsed_ms;

        if let (Some(entry), Some(identity_id), true) =
            (entry, context.identity_id, self.enable_history)
        {
            let record = AuditRecord {
                id: Uuid::new_v4(),
                identity_id,
                tenant_id: context.tenant_id,
                natural_language_query: response.natural_language_query.clone(),
                generated_sql: entry.generated_sql,
                success: response.success,
                error_message: entry.error_message,
                result_count: response.total_rows,
                elapsed_ms,
                created_at: Utc::now(),
            };
            if let Err(e) = self.audit.append(record).await {
                tracing::warn!(error = %e, "Failed to write audit record");
            }
        }

        self.metrics.observe(outcome, elapsed_ms);
        tracing::info!(
            outcome = outcome.as_str(),
            rows = response.total_rows,
            elapsed_ms,
            "Query finished"
        );

        if !self.enable_sql_preview {
            response.generated_sql = None;
        }
        response
    }

    /// Caller's recent attempts, newest first. `limit` defaults to 20, clamped to 1..=100.
    pub async fn history(
        &self,
        context: &RequestContext,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let Some(identity_id) = context.identity_id else {
            return Ok(Vec::new());
        };
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.audit.history(identity_id, limit).await
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Run `query` and render its rows as CSV.
    pub async fn export_csv(
        &self,
        query: &str,
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExportError> {
        let response = self.process(query, context, cancel).await;
        if !response.success {
            let message = response
                .error
                .or(response.clarification_message)
                .unwrap_or_else(|| EXECUTION_FAILED.to_string());
            return Err(ExportError::Query(message));
        }
        to_csv(&response.columns, &response.rows)
    }
}

fn execution_message(err: &ExecutionError) -> &'static str {
    match err {
        ExecutionError::Timeout(_) => EXECUTION_TIMEOUT,
        ExecutionError::Cancelled => REQUEST_CANCELLED,
        ExecutionError::Bind(_) | ExecutionError::Database(_) => EXECUTION_FAILED,
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Guard warnings first, then the draft's own, without repeats.
fn merge_warnings(mut guard: Vec<String>, draft: Vec<String>) -> Vec<String> {
    for warning in draft {
        if !guard.contains(&warning) {
            guard.push(warning);
        }
    }
    guard
}

//! HTTP surface
//!
//! - `POST /api/nlp-query` run a question
//! - `POST /api/nlp-query/export/csv` run a question, download rows as CSV
//! - `GET /api/nlp-query/history` caller's recent attempts
//! - `GET /api/nlp-query/suggestions` example questions
//! - `GET /health`, `GET /metrics`
//!
//! The POST routes sit behind the per-identity rate limiter.

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nlq_guard::RateLimiter;
use nlq_ir::{resolve_context, AccessError, AccessResolver, CancellationToken, RequestContext};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::access::claims_from_headers;
use crate::export::ExportError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::QueryPipeline;

const RATE_LIMITED: &str = "Rate limit exceeded. Please wait before making more queries.";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub resolver: Arc<dyn AccessResolver>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: PipelineMetrics,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Lookup(detail) => {
                tracing::error!(error = %detail, "Scope lookup failed");
                ApiError::Internal("Could not resolve your access scope.".to_string())
            }
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/api/nlp-query", post(query_handler))
        .route("/api/nlp-query/export/csv", post(export_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(limited)
        .route("/api/nlp-query/history", get(history_handler))
        .route("/api/nlp-query/suggestions", get(suggestions_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn remote_ip(connect: Option<&ConnectInfo<SocketAddr>>) -> Option<std::net::IpAddr> {
    connect.map(|ConnectInfo(addr)| addr.ip())
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let claims = claims_from_headers(
        req.headers(),
        remote_ip(req.extensions().get::<ConnectInfo<SocketAddr>>()),
    );
    let key = claims.rate_limit_key();
    let admission = state.limiter.admit(&key);

    if !admission.admitted {
        let retry_after = admission.retry_after.map_or(60, |d| d.as_secs());
        state.metrics.rate_limited();
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": RATE_LIMITED, "retryAfterSeconds": retry_after })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(admission.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(admission.remaining));
    response
}

async fn request_context(
    state: &AppState,
    headers: &HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Result<RequestContext, ApiError> {
    let claims = claims_from_headers(headers, remote_ip(connect.as_ref()));
    Ok(resolve_context(state.resolver.as_ref(), &claims).await?)
}

fn non_empty_query(request: QueryRequest) -> Result<String, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }
    Ok(query.to_string())
}

async fn query_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let query = non_empty_query(request)?;
    let context = request_context(&state, &headers, connect).await?;

    // Dropped with the handler future when the client goes away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = state.pipeline.process(&query, &context, &cancel).await;
    Ok(Json(response).into_response())
}

async fn export_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let query = non_empty_query(request)?;
    let context = request_context(&state, &headers, connect).await?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let csv = match state.pipeline.export_csv(&query, &context, &cancel).await {
        Ok(csv) => csv,
        Err(ExportError::Query(message)) => return Err(ApiError::BadRequest(message)),
        Err(e) => {
            tracing::error!(error = %e, "CSV export failed");
            return Err(ApiError::Internal("Could not export results.".to_string()));
        }
    };

    let filename = format!(
        "query-results-{}.csv",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(csv),
    )
        .into_response())
}

async fn history_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let context = request_context(&state, &headers, connect).await?;
    let records = state
        .pipeline
        .history(&context, params.limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "History lookup failed");
            ApiError::Internal("Could not load query history.".to_string())
        })?;
    Ok(Json(records).into_response())
}

async fn suggestions_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.suggestions().to_vec())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, state.metrics.format_type())],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

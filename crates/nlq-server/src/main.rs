//! NLQ server binary
//!
//! Loads config.yaml (or `NLQ_CONFIG`) plus `.env`, opens the reporting
//! database and serves the HTTP API.

use anyhow::Context;
use nlq_duck::{DuckAuditLog, DuckReferenceData, DuckScopeDirectory, DuckStore};
use nlq_guard::RateLimiter;
use nlq_server::{
    config::Config, logging, router, AppState, ClaimsResolver, OpenAiDraftSource,
    PipelineMetrics, QueryPipeline,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables (secrets)
    dotenvy::dotenv().ok();

    let config_path = std::env::var("NLQ_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path))?;

    config.apply_logging_env();
    logging::init();

    let store = if config.database.path == ":memory:" {
        DuckStore::open_in_memory()
    } else {
        DuckStore::open(&config.database.path)
    }
    .with_context(|| format!("failed to open database {}", config.database.path))?;

    if config.database.bootstrap_schema {
        store
            .bootstrap_schema()
            .context("failed to create reporting schema")?;
    }

    let catalog = store
        .catalog(&config.query.policy.allowed_tables)
        .context("failed to read schema catalog")?;
    info!(tables = catalog.tables.len(), "Schema catalog loaded");

    let api_key = Config::llm_api_key()?;
    info!(model = %config.llm.model, "Using draft model");
    let reference = DuckReferenceData::from_store(&store).context("failed to open reference data")?;
    let drafts = OpenAiDraftSource::new(&config.llm, api_key, catalog.to_markdown())
        .with_reference_data(Arc::new(reference));

    let audit = DuckAuditLog::from_store(&store).context("failed to open audit log")?;
    let directory = DuckScopeDirectory::from_store(&store).context("failed to open scope directory")?;
    let metrics = PipelineMetrics::new().context("failed to register metrics")?;

    let pipeline = QueryPipeline::new(
        Arc::new(drafts),
        Arc::new(store),
        Arc::new(audit),
        metrics.clone(),
        &config.query,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        resolver: Arc::new(ClaimsResolver::with_directory(Arc::new(directory))),
        limiter: Arc::new(RateLimiter::new(
            config.query.rate_limit_per_minute,
            config.query.rate_limit_max_identities,
        )),
        metrics,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Starting NLQ server on {}", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server exited unexpectedly")?;

    Ok(())
}

//! Natural-language reporting query server
//!
//! Turns a manager's question into a guarded, scope-bound DuckDB query and
//! serves the result over HTTP.

pub mod access;
pub mod api;
pub mod config;
pub mod export;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use access::{claims_from_headers, ClaimsResolver};
pub use api::{router, AppState};
pub use config::{Config, ConfigError};
pub use export::{to_csv, ExportError};
pub use llm::{parse_draft_response, OpenAiDraftSource};
pub use metrics::{Outcome, PipelineMetrics};
pub use pipeline::{QueryPipeline, QueryResponse};

//! Candidate SQL produced from natural language

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::RequestContext;

/// A generated SELECT statement with its named parameters.
///
/// Parameter names are given without the `@` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlDraft {
    pub sql: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub explanation: String,

    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SqlDraft {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: BTreeMap::new(),
            explanation: String::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }
}

/// Outcome of asking the draft source for a query. Exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDraft {
    Sql(SqlDraft),
    /// The model needs more detail before it can write a query.
    Clarification { message: String },
    /// The model answered, but not with anything usable.
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Draft source unavailable: {0}")]
    Unavailable(String),

    #[error("Draft generation cancelled")]
    Cancelled,
}

/// Text-generation service that turns a question into a [`QueryDraft`].
///
/// Implementations are not trusted for authorization: whatever they return is
/// validated and re-bound against the caller's [`RequestContext`].
#[async_trait]
pub trait DraftSource: Send + Sync {
    async fn generate_draft(
        &self,
        query: &str,
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<QueryDraft, DraftError>;
}

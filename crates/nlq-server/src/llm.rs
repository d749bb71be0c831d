//! OpenAI-compatible draft source: natural language to parameterized SQL

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use nlq_ir::{
    CancellationToken, DraftError, DraftSource, QueryDraft, ReferenceData, ReferenceFacts,
    RequestContext, SqlDraft,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LlmConfig;

/// System prompt: generation rules and the response contract
const SYSTEM_PROMPT: &str = r#"You are a SQL query generation assistant for a historical reporting system. Convert natural language questions into a single read-only DuckDB SELECT statement.

## Rules
1. ONLY generate SELECT queries - never INSERT, UPDATE, DELETE, DROP, or any DDL
2. Always use parameter placeholders (@ParameterName) for dynamic values
3. Always filter by organisation with @TenantId (e.g. WHERE d.OrganisationId = @TenantId)
4. When the caller is limited to specific departments, filter department ids with the placeholders @SubScopeId0, @SubScopeId1, ... listed in the context message
5. The current manager's id is available as @IdentityId
6. Never define values for TenantId, IdentityId or SubScopeIdN yourself; they are bound by the server
7. Never select PasswordHash or other sensitive columns
8. No comments, no semicolon-separated statements, no file or URL reads
9. Use LIMIT N to limit large result sets (default LIMIT 1000)
10. Include ORDER BY for predictable results
11. The AuditRecords.Date column is a yyyyMMdd integer

## Response Format
When you have enough information to generate a query, respond with ONLY a JSON object:
{
    "sql": "The generated SQL query with @Parameters",
    "parameters": { "ParameterName": "value" },
    "explanation": "Brief explanation of what the query does",
    "warnings": ["Any warnings or limitations"]
}

If you need more information, ask a clarifying question in plain text instead.

## Common Patterns
- Count by status: COUNT(*) with GROUP BY Status
- Monthly aggregation: GROUP BY Date / 10000, (Date / 100) % 100
- Department filtering: JOIN OrganisationUsers ou ON a.UserId = ou.Id JOIN Departments d ON ou.DepartmentId = d.Id
- Valid/invalid split: SUM(CASE WHEN a.Status = 'Valid' THEN 1 ELSE 0 END)"#;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Api(#[from] OpenAIError),

    #[error("LLM returned no content")]
    EmptyResponse,
}

pub struct OpenAiDraftSource {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    schema: String,
    reference: Option<Arc<dyn ReferenceData>>,
}

impl OpenAiDraftSource {
    /// `schema` is appended to the system prompt (see `SchemaCatalog::to_markdown`).
    pub fn new(config: &LlmConfig, api_key: String, schema: String) -> Self {
        let mut openai = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.api_base {
            openai = openai.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai),
            model: config.model.clone(),
            temperature: config.temperature,
            schema,
            reference: None,
        }
    }

    /// Add status values, the audit date range and department names to
    /// every context message.
    pub fn with_reference_data(mut self, reference: Arc<dyn ReferenceData>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Missing reference data only costs prompt detail, so failures degrade.
    async fn reference_facts(&self, context: &RequestContext) -> ReferenceFacts {
        let Some(reference) = &self.reference else {
            return ReferenceFacts::default();
        };
        match reference.facts(context).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(error = %e, "Reference data unavailable for draft context");
                ReferenceFacts::default()
            }
        }
    }

    fn system_prompt(&self) -> String {
        if self.schema.is_empty() {
            SYSTEM_PROMPT.to_string()
        } else {
            format!("{}\n\n{}", SYSTEM_PROMPT, self.schema)
        }
    }

    async fn complete(&self, query: &str, context: &RequestContext) -> Result<String, LlmError> {
        let facts = self.reference_facts(context).await;
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_prompt())
                    .build()?,
            ),
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(context_message(context, &facts))
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(query)
                    .build()?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl DraftSource for OpenAiDraftSource {
    async fn generate_draft(
        &self,
        query: &str,
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<QueryDraft, DraftError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DraftError::Cancelled),
            outcome = self.complete(query, context) => outcome,
        };

        match outcome {
            Ok(content) => {
                tracing::debug!(chars = content.len(), "Draft response received");
                Ok(parse_draft_response(&content))
            }
            Err(LlmError::EmptyResponse) => Ok(QueryDraft::Failed {
                error: "The language model returned an empty response.".to_string(),
            }),
            Err(e) => {
                tracing::error!(error = %e, "Draft source call failed");
                Err(DraftError::Unavailable(e.to_string()))
            }
        }
    }
}

/// Per-request facts about the caller's scope and the data it can see.
pub fn context_message(context: &RequestContext, facts: &ReferenceFacts) -> String {
    let mut parts = vec![format!(
        "Current user's organisation ID: {} (bound as @TenantId)",
        context.tenant_id
    )];

    if let Some(identity) = context.identity_id {
        parts.push(format!("Current manager ID: {} (bound as @IdentityId)", identity));
    }

    if context.has_full_scope_access {
        parts.push("This manager has access to ALL departments in their organisation.".to_string());
    } else if !context.accessible_sub_scope_ids.is_empty() {
        let placeholders: Vec<String> = (0..context.accessible_sub_scope_ids.len())
            .map(|i| format!("@SubScopeId{}", i))
            .collect();
        parts.push(format!(
            "This manager has access to {} department(s), bound as {}.",
            placeholders.len(),
            placeholders.join(", ")
        ));
        parts.push(
            "IMPORTANT: Filter results to only these departments, e.g. d.Id IN (...placeholders...)."
                .to_string(),
        );
    }

    if !facts.departments.is_empty() {
        let listed: Vec<String> = facts
            .departments
            .iter()
            .map(|d| match &d.placeholder {
                Some(p) => format!("- {} (@{})", d.name, p),
                None => format!("- {}", d.name),
            })
            .collect();
        parts.push(format!(
            "Departments this manager can see (match names the user mentions to these):\n{}",
            listed.join("\n")
        ));
    }

    if !facts.status_values.is_empty() {
        let quoted: Vec<String> = facts
            .status_values
            .iter()
            .map(|s| format!("'{}'", s.replace('\'', "''")))
            .collect();
        parts.push(format!("AuditRecords.Status values: {}", quoted.join(", ")));
    }

    if let Some((first, last)) = facts.date_range {
        parts.push(format!("Audit records span Date {} to {} (yyyyMMdd).", first, last));
    }

    parts.join("\n")
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    #[serde(default, alias = "Sql", alias = "SQL")]
    sql: Option<String>,
    #[serde(default, alias = "Parameters")]
    parameters: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, alias = "Explanation")]
    explanation: Option<String>,
    #[serde(default, alias = "Warnings")]
    warnings: Option<Vec<String>>,
}

/// Parse a model reply: the outermost `{...}` object if it carries SQL,
/// otherwise the whole reply is a clarification request.
pub fn parse_draft_response(text: &str) -> QueryDraft {
    let parsed = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<DraftResponse>(&text[start..=end]).ok()
        }
        _ => None,
    };

    match parsed {
        Some(DraftResponse {
            sql: Some(sql),
            parameters,
            explanation,
            warnings,
        }) if !sql.trim().is_empty() => QueryDraft::Sql(SqlDraft {
            sql,
            parameters: parameters.unwrap_or_default(),
            explanation: explanation.unwrap_or_else(|| "Query generated successfully.".to_string()),
            warnings: warnings.unwrap_or_default(),
        }),
        _ => QueryDraft::Clarification {
            message: text.trim().to_string(),
        },
    }
}

//! Access rewriting: row cap plus authorization-bound parameters
//!
//! Authorization is enforced at the binding layer. The drafted statement is
//! expected to filter on `@TenantId` / `@SubScopeId<n>`; the rewriter makes
//! sure those parameters always carry the caller's real scope, whatever the
//! model declared.

use nlq_ir::{ParamValue, RequestContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::patterns::{has_row_limit, LEADING_SELECT};
use crate::validate::ValidatedSql;

pub const TENANT_PARAM: &str = "TenantId";
pub const IDENTITY_PARAM: &str = "IdentityId";
pub const SUB_SCOPE_PARAM_PREFIX: &str = "SubScopeId";

/// How a default row cap is written into the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowCapStyle {
    /// `SELECT TOP n ...` (SQL Server)
    Top,
    /// `... LIMIT n` (DuckDB, PostgreSQL, SQLite)
    #[default]
    Limit,
}

/// Statement ready for execution under the caller's scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    sql: String,
    parameters: BTreeMap<String, ParamValue>,
    warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters by name (no `@` prefix).
    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    /// Validator warnings plus any raised while binding.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// SHA-256 over the statement text and parameter names, for log correlation.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        for name in self.parameters.keys() {
            hasher.update(b"\0");
            hasher.update(name.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Plan(ExecutionPlan),
    /// Caller sees no sub-scope and lacks full access: nothing may run.
    EmptyScope { sql: String, warnings: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct AccessRewriter {
    style: RowCapStyle,
    row_cap: usize,
}

impl AccessRewriter {
    pub fn new(style: RowCapStyle, row_cap: usize) -> Self {
        Self { style, row_cap }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Add the default row cap unless the statement already limits its rows.
    pub fn enforce_row_cap(&self, sql: &str) -> String {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        if has_row_limit(trimmed) {
            return trimmed.to_string();
        }

        match self.style {
            RowCapStyle::Top => LEADING_SELECT
                .replace(trimmed, |caps: &regex::Captures| {
                    let modifier = caps.get(1).map_or("", |m| m.as_str());
                    format!("SELECT {}TOP {} ", modifier, self.row_cap)
                })
                .into_owned(),
            RowCapStyle::Limit => format!("{} LIMIT {}", trimmed, self.row_cap),
        }
    }

    /// Turn a validated statement into an execution plan for `context`.
    pub fn rewrite(
        &self,
        validated: ValidatedSql,
        model_parameters: &BTreeMap<String, serde_json::Value>,
        context: &RequestContext,
    ) -> Rewrite {
        let (sql, mut warnings) = validated.into_parts();
        let sql = self.enforce_row_cap(&sql);

        if !context.has_visible_scope() {
            return Rewrite::EmptyScope { sql, warnings };
        }

        let mut parameters = BTreeMap::new();
        parameters.insert(TENANT_PARAM.to_string(), ParamValue::from(context.tenant_id));

        if let Some(identity_id) = context.identity_id {
            parameters.insert(IDENTITY_PARAM.to_string(), ParamValue::from(identity_id));
        }

        if !context.has_full_scope_access {
            for (idx, id) in context.accessible_sub_scope_ids.iter().enumerate() {
                parameters.insert(format!("{}{}", SUB_SCOPE_PARAM_PREFIX, idx), ParamValue::from(*id));
            }
        }

        for (name, value) in model_parameters {
            let name = name.trim_start_matches('@');
            if name.is_empty() {
                continue;
            }
            if is_reserved_parameter(name) {
                tracing::warn!(parameter = name, "Draft tried to define a reserved parameter");
                warnings.push(format!(
                    "Parameter '@{}' is reserved for access control and was ignored.",
                    name
                ));
                continue;
            }
            parameters.insert(name.to_string(), ParamValue::from(value));
        }

        Rewrite::Plan(ExecutionPlan {
            sql,
            parameters,
            warnings,
        })
    }
}

impl Default for AccessRewriter {
    fn default() -> Self {
        Self::new(RowCapStyle::default(), 1000)
    }
}

/// Names the security layer owns, case-insensitively.
pub fn is_reserved_parameter(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower == TENANT_PARAM.to_ascii_lowercase() || lower == IDENTITY_PARAM.to_ascii_lowercase() {
        return true;
    }
    let prefix = SUB_SCOPE_PARAM_PREFIX.to_ascii_lowercase();
    match lower.strip_prefix(&prefix) {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

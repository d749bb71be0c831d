//! Static validation of drafted SQL
//!
//! Blocking checks:
//! - statement must start with SELECT
//! - no forbidden keyword (DML, DDL, privileges, admin, external data)
//! - no credential-like column
//! - no comment markers
//! - exactly one statement
//! - no file/URL scans
//!
//! Advisory checks produce warnings only: UNION SELECT, tables outside the
//! allow-list, unfiltered scans of the high-volume table, missing row limit.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::patterns::{
    has_row_limit, normalize, LITERAL_SOURCE, STARTS_WITH_SELECT, TABLE_REF, UNION_SELECT,
    WHERE_CLAUSE,
};
use crate::policy::{GuardPolicy, FORBIDDEN_COLUMNS, FORBIDDEN_KEYWORDS};

/// Verdict for one drafted statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn pass(warnings: Vec<String>) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            warnings,
        }
    }

    pub fn fail(error: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(error.into()),
            warnings,
        }
    }
}

/// A statement that passed validation. Only [`SqlValidator::accept`] makes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql {
    sql: String,
    warnings: Vec<String>,
}

impl ValidatedSql {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>) {
        (self.sql, self.warnings)
    }
}

/// Stateless validator; the same text always yields the same result.
pub struct SqlValidator {
    keywords: Vec<(&'static str, Regex)>,
    columns: Vec<(&'static str, Regex)>,
    allowed_tables: HashSet<String>,
    high_volume_table: Option<Regex>,
}

impl SqlValidator {
    pub fn new(policy: GuardPolicy) -> Self {
        let keywords = FORBIDDEN_KEYWORDS
            .iter()
            .map(|kw| {
                let escaped = regex::escape(kw);
                let pattern = if kw.ends_with('_') {
                    format!(r"(?i)\b{}\w*", escaped)
                } else {
                    format!(r"(?i)\b{}\b", escaped)
                };
                (*kw, Regex::new(&pattern).expect("keyword pattern is valid"))
            })
            .collect();

        let columns = FORBIDDEN_COLUMNS
            .iter()
            .map(|col| {
                let escaped = regex::escape(col);
                let pattern = format!(r"(?i)\b{0}\b|\[\s*{0}\s*\]", escaped);
                (*col, Regex::new(&pattern).expect("column pattern is valid"))
            })
            .collect();

        let high_volume_table = policy.high_volume_table.as_deref().map(|table| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(table)))
                .expect("table pattern is valid")
        });

        Self {
            keywords,
            columns,
            allowed_tables: policy
                .allowed_tables
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            high_volume_table,
        }
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        if sql.trim().is_empty() {
            return ValidationResult::fail("SQL query cannot be empty.", Vec::new());
        }

        let normalized = normalize(sql);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (keyword, pattern) in &self.keywords {
            if pattern.is_match(&normalized) {
                errors.push(format!(
                    "Forbidden keyword detected: {}. Only SELECT queries are allowed.",
                    keyword
                ));
            }
        }

        for (column, pattern) in &self.columns {
            if pattern.is_match(&normalized) {
                errors.push(format!(
                    "Forbidden column detected: {}. This column cannot be selected.",
                    column
                ));
            }
        }

        if normalized.contains("--") || normalized.contains("/*") {
            errors.push("SQL comments are not allowed.".to_string());
        }

        if has_multiple_statements(&normalized) {
            errors.push("Multiple SQL statements are not allowed.".to_string());
        }

        if !STARTS_WITH_SELECT.is_match(&normalized) {
            errors.push("Query must start with SELECT.".to_string());
        }

        if LITERAL_SOURCE.is_match(&normalized) {
            errors.push("Reading from files or URLs is not allowed.".to_string());
        }

        if UNION_SELECT.is_match(&normalized) {
            warnings.push("UNION SELECT detected. Ensure this is intentional.".to_string());
        }

        for table in referenced_tables(&normalized) {
            if !self.allowed_tables.contains(&table.to_ascii_lowercase()) {
                warnings.push(format!("Query references table '{}' which may not exist.", table));
            }
        }

        if let Some(pattern) = &self.high_volume_table {
            if pattern.is_match(&normalized) && !WHERE_CLAUSE.is_match(&normalized) {
                let table = pattern
                    .find(&normalized)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                warnings.push(format!("Query on {} without WHERE clause may be slow.", table));
            }
        }

        if !has_row_limit(&normalized) {
            warnings.push("Consider limiting results with TOP N or LIMIT N.".to_string());
        }

        if errors.is_empty() {
            ValidationResult::pass(warnings)
        } else {
            ValidationResult::fail(errors.join(" "), warnings)
        }
    }

    /// Validate and, on success, hand back the statement in its checked form.
    pub fn accept(&self, sql: &str) -> Result<ValidatedSql, ValidationResult> {
        let result = self.validate(sql);
        if result.is_valid {
            Ok(ValidatedSql {
                sql: sql.trim().to_string(),
                warnings: result.warnings,
            })
        } else {
            Err(result)
        }
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(GuardPolicy::default())
    }
}

fn has_multiple_statements(sql: &str) -> bool {
    let semicolons = sql.matches(';').count();
    semicolons > 1 || (semicolons == 1 && !sql.trim_end().ends_with(';'))
}

/// Distinct FROM/JOIN targets, last dotted segment, quoting stripped.
fn referenced_tables(sql: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();

    for caps in TABLE_REF.captures_iter(sql) {
        let raw = &caps[1];
        let name = raw
            .rsplit('.')
            .next()
            .unwrap_or(raw)
            .trim_matches(|c| matches!(c, '[' | ']' | '"' | '`'));
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_ascii_lowercase()) {
            tables.push(name.to_string());
        }
    }

    tables
}

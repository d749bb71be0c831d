//! Text patterns shared by the validator and the rewriter
//!
//! These are heuristics over statement text, not a grammar. They can both
//! over- and under-match (a keyword inside a string literal is still a
//! keyword here).

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

pub(crate) static STARTS_WITH_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^SELECT\b").expect("valid regex"));

pub(crate) static UNION_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b").expect("valid regex"));

/// Table reference after FROM/JOIN; brackets, quotes and schema prefixes included.
pub(crate) static TABLE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+([\[\]"`\w.]+)"#).expect("valid regex"));

/// FROM/JOIN followed by a string literal: DuckDB treats it as a file or URL scan.
pub(crate) static LITERAL_SOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+'").expect("valid regex"));

pub(crate) static WHERE_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid regex"));

/// Any clause that bounds the number of returned rows.
pub(crate) static ROW_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bTOP\s*\(?\s*\d+|\bLIMIT\s+\d+|\bOFFSET\b|\bFETCH\s+(?:FIRST|NEXT)\b")
        .expect("valid regex")
});

pub(crate) static LEADING_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^SELECT\s+((?:DISTINCT|ALL)\s+)?").expect("valid regex"));

/// Collapse runs of whitespace to single spaces and trim.
pub(crate) fn normalize(sql: &str) -> String {
    WHITESPACE.replace_all(sql, " ").trim().to_string()
}

pub(crate) fn has_row_limit(sql: &str) -> bool {
    ROW_LIMIT.is_match(sql)
}

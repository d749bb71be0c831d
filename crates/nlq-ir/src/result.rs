//! Tabular query results

use serde::{Deserialize, Serialize};

/// One result row keyed by column name. Engine nulls are explicit `null`s.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    /// Column names in engine order.
    pub columns: Vec<String>,
    /// Buffered rows, at most the executor's row cap.
    pub rows: Vec<Row>,
    /// Number of rows the statement actually matched.
    pub total_row_count: usize,
    pub was_truncated: bool,
    pub elapsed_ms: f64,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self::default()
    }
}

//! CSV rendering of query results

use nlq_ir::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// The query itself did not succeed; the message is caller-facing.
    #[error("{0}")]
    Query(String),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer failed: {0}")]
    Buffer(String),
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Header row then one record per row, in column order.
///
/// Fields containing a comma, quote or line break are quoted, with quotes
/// doubled. Records end in CRLF.
pub fn to_csv(columns: &[String], rows: &[Row]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| cell_text(row.get(c))))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))
}

//! Append-only audit trail of query attempts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One completed pipeline attempt. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub natural_language_query: String,
    pub generated_sql: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub result_count: usize,
    pub elapsed_ms: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit store error: {0}")]
    Store(String),
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// Most recent records for one identity, newest first.
    async fn history(&self, identity_id: Uuid, limit: usize) -> Result<Vec<AuditRecord>, AuditError>;
}

/// Process-local audit log.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, in write order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn history(&self, identity_id: Uuid, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.lock();
        let mut mine: Vec<AuditRecord> = records
            .iter()
            .filter(|r| r.identity_id == identity_id)
            .cloned()
            .collect();
        // Stable sort keeps write order for equal timestamps; reverse gives newest first
        mine.sort_by_key(|r| r.created_at);
        mine.reverse();
        mine.truncate(limit);
        Ok(mine)
    }
}

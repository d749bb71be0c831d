//! `NlpQueryLogs` audit persistence

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use nlq_ir::{AuditError, AuditLog, AuditRecord};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::schema::NLP_QUERY_LOGS_DDL;
use crate::store::DuckStore;

/// Audit log stored in the reporting database.
///
/// `CreatedAt` is fixed-width RFC 3339 text, so ordering by it is chronological.
pub struct DuckAuditLog {
    conn: Arc<Mutex<Connection>>,
}

impl DuckAuditLog {
    pub fn new(conn: Connection) -> duckdb::Result<Self> {
        conn.execute_batch(NLP_QUERY_LOGS_DDL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_store(store: &DuckStore) -> duckdb::Result<Self> {
        Self::new(store.connect()?)
    }
}

fn store_err(err: impl std::fmt::Display) -> AuditError {
    AuditError::Store(err.to_string())
}

type StoredRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    bool,
    Option<String>,
    i64,
    f64,
    String,
);

fn parse_row(row: StoredRow) -> Result<AuditRecord, AuditError> {
    let (id, manager, organisation, query, sql, success, error, count, elapsed, created) = row;
    Ok(AuditRecord {
        id: Uuid::parse_str(&id).map_err(store_err)?,
        identity_id: Uuid::parse_str(&manager).map_err(store_err)?,
        tenant_id: Uuid::parse_str(&organisation).map_err(store_err)?,
        natural_language_query: query,
        generated_sql: sql,
        success,
        error_message: error,
        result_count: usize::try_from(count).unwrap_or_default(),
        elapsed_ms: elapsed,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map_err(store_err)?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl AuditLog for DuckAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO NlpQueryLogs (Id, ManagerId, OrganisationId, NaturalLanguageQuery,
                    GeneratedSql, Success, ErrorMessage, ResultCount, ExecutionTimeMs, CreatedAt)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.to_string(),
                    record.identity_id.to_string(),
                    record.tenant_id.to_string(),
                    record.natural_language_query,
                    record.generated_sql,
                    record.success,
                    record.error_message,
                    record.result_count as i64,
                    record.elapsed_ms,
                    record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )
        })
        .await
        .map_err(store_err)?
        .map_err(store_err)?;
        Ok(())
    }

    async fn history(&self, identity_id: Uuid, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = Arc::clone(&self.conn);
        let rows = tokio::task::spawn_blocking(move || -> duckdb::Result<Vec<StoredRow>> {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT Id, ManagerId, OrganisationId, NaturalLanguageQuery, GeneratedSql,
                        Success, ErrorMessage, ResultCount, ExecutionTimeMs, CreatedAt
                 FROM NlpQueryLogs
                 WHERE ManagerId = ?
                 ORDER BY CreatedAt DESC
                 LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![identity_id.to_string(), limit as i64], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                })?
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(store_err)?
        .map_err(store_err)?;

        rows.into_iter().map(parse_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(identity_id: Uuid, query: &str, minutes_ago: i64) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            identity_id,
            tenant_id: Uuid::new_v4(),
            natural_language_query: query.to_string(),
            generated_sql: Some("SELECT 1".to_string()),
            success: minutes_ago % 2 == 0,
            error_message: None,
            result_count: 3,
            elapsed_ms: 12.5,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_order() -> Result<(), Box<dyn std::error::Error>> {
        let store = DuckStore::open_in_memory()?;
        let log = DuckAuditLog::from_store(&store)?;
        let alice = Uuid::new_v4();

        log.append(record(alice, "older", 10)).await?;
        log.append(record(alice, "newest", 1)).await?;
        log.append(record(Uuid::new_v4(), "someone else", 0)).await?;
        let mut middle = record(alice, "middle", 5);
        middle.generated_sql = None;
        middle.error_message = Some("Could not generate SQL".to_string());
        log.append(middle.clone()).await?;

        let history = log.history(alice, 20).await?;
        let queries: Vec<_> = history.iter().map(|r| r.natural_language_query.as_str()).collect();
        assert_eq!(queries, vec!["newest", "middle", "older"]);
        assert_eq!(history[1].generated_sql, None);
        assert_eq!(history[1].error_message, middle.error_message);
        assert_eq!(history[1].id, middle.id);

        assert_eq!(log.history(alice, 1).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reporting.duckdb");
        let alice = Uuid::new_v4();

        {
            let store = DuckStore::open(&path)?;
            let log = DuckAuditLog::from_store(&store)?;
            log.append(record(alice, "before restart", 0)).await?;
        }

        let store = DuckStore::open(&path)?;
        let log = DuckAuditLog::from_store(&store)?;
        let history = log.history(alice, 20).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].natural_language_query, "before restart");
        assert_eq!(history[0].result_count, 3);
        Ok(())
    }
}

//! Manager scope facts from the reporting tables

use async_trait::async_trait;
use duckdb::{params, Connection, OptionalExt};
use nlq_ir::{AccessError, ScopeDirectory};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::DuckStore;

/// Reads `Managers.ManagesAllDepartments` and `ManagerDepartments.DepartmentId`.
pub struct DuckScopeDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl DuckScopeDirectory {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_store(store: &DuckStore) -> duckdb::Result<Self> {
        Ok(Self::new(store.connect()?))
    }
}

fn lookup_err(err: impl std::fmt::Display) -> AccessError {
    AccessError::Lookup(err.to_string())
}

#[async_trait]
impl ScopeDirectory for DuckScopeDirectory {
    async fn manages_all_sub_scopes(&self, identity_id: Uuid) -> Result<bool, AccessError> {
        let conn = Arc::clone(&self.conn);
        let found = tokio::task::spawn_blocking(move || {
            conn.lock()
                .query_row(
                    "SELECT ManagesAllDepartments FROM Managers WHERE CAST(Id AS VARCHAR) = ?",
                    params![identity_id.to_string()],
                    |row| row.get::<_, bool>(0),
                )
                .optional()
        })
        .await
        .map_err(lookup_err)?
        .map_err(lookup_err)?;

        // Unknown manager: no blanket access
        Ok(found.unwrap_or(false))
    }

    async fn sub_scope_ids(&self, identity_id: Uuid) -> Result<Vec<Uuid>, AccessError> {
        let conn = Arc::clone(&self.conn);
        let ids = tokio::task::spawn_blocking(move || -> duckdb::Result<Vec<String>> {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT CAST(DepartmentId AS VARCHAR) FROM ManagerDepartments
                 WHERE CAST(ManagerId AS VARCHAR) = ?
                 ORDER BY 1",
            )?;
            let ids = stmt
                .query_map(params![identity_id.to_string()], |row| row.get(0))?
                .collect::<duckdb::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
        .map_err(lookup_err)?
        .map_err(lookup_err)?;

        ids.iter()
            .map(|id| Uuid::parse_str(id).map_err(lookup_err))
            .collect()
    }
}

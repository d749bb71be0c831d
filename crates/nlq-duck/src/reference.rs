//! Status values, audit date range and department names for the draft prompt

use async_trait::async_trait;
use duckdb::{params, Connection};
use nlq_guard::SUB_SCOPE_PARAM_PREFIX;
use nlq_ir::{DepartmentRef, LookupError, ReferenceData, ReferenceFacts, RequestContext};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::DuckStore;

pub struct DuckReferenceData {
    conn: Arc<Mutex<Connection>>,
}

impl DuckReferenceData {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_store(store: &DuckStore) -> duckdb::Result<Self> {
        Ok(Self::new(store.connect()?))
    }
}

fn lookup_err(err: impl std::fmt::Display) -> LookupError {
    LookupError(err.to_string())
}

struct Raw {
    statuses: Vec<String>,
    range: (Option<i64>, Option<i64>),
    departments: Vec<(String, String)>,
}

fn load(conn: &Connection, tenant: &str) -> duckdb::Result<Raw> {
    let statuses = conn
        .prepare(
            "SELECT DISTINCT a.Status
             FROM AuditRecords a
             JOIN OrganisationUsers ou ON a.UserId = ou.Id
             WHERE ou.OrganisationId = ?
             ORDER BY 1",
        )?
        .query_map(params![tenant], |row| row.get(0))?
        .collect::<duckdb::Result<Vec<String>>>()?;

    let range = conn.query_row(
        "SELECT MIN(a.\"Date\"), MAX(a.\"Date\")
         FROM AuditRecords a
         JOIN OrganisationUsers ou ON a.UserId = ou.Id
         WHERE ou.OrganisationId = ?",
        params![tenant],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let departments = conn
        .prepare(
            "SELECT CAST(Id AS VARCHAR), Name FROM Departments
             WHERE OrganisationId = ?
             ORDER BY Name",
        )?
        .query_map(params![tenant], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<duckdb::Result<Vec<(String, String)>>>()?;

    Ok(Raw {
        statuses,
        range,
        departments,
    })
}

/// Keep the departments `context` may see. Scoped callers get them in
/// placeholder order, each tagged with its `SubScopeId<n>`.
fn visible_departments(
    context: &RequestContext,
    rows: Vec<(String, String)>,
) -> Result<Vec<DepartmentRef>, LookupError> {
    let mut named = Vec::with_capacity(rows.len());
    for (id, name) in rows {
        named.push((Uuid::parse_str(&id).map_err(lookup_err)?, name));
    }

    if context.has_full_scope_access {
        return Ok(named
            .into_iter()
            .map(|(id, name)| DepartmentRef {
                id,
                name,
                placeholder: None,
            })
            .collect());
    }

    let mut by_id: HashMap<Uuid, String> = named.into_iter().collect();
    Ok(context
        .accessible_sub_scope_ids
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| {
            by_id.remove(id).map(|name| DepartmentRef {
                id: *id,
                name,
                placeholder: Some(format!("{}{}", SUB_SCOPE_PARAM_PREFIX, idx)),
            })
        })
        .collect())
}

#[async_trait]
impl ReferenceData for DuckReferenceData {
    async fn facts(&self, context: &RequestContext) -> Result<ReferenceFacts, LookupError> {
        let conn = Arc::clone(&self.conn);
        let tenant = context.tenant_id.to_string();
        let raw = tokio::task::spawn_blocking(move || load(&conn.lock(), &tenant))
            .await
            .map_err(lookup_err)?
            .map_err(lookup_err)?;

        Ok(ReferenceFacts {
            status_values: raw.statuses,
            date_range: match raw.range {
                (Some(first), Some(last)) => Some((first, last)),
                _ => None,
            },
            departments: visible_departments(context, raw.departments)?,
        })
    }
}

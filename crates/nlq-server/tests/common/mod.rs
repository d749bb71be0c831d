//! Shared fixtures for server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nlq_duck::DuckStore;
use nlq_ir::{
    BoundStatement, CancellationToken, DraftError, DraftSource, Interrupt, QueryDraft,
    RequestContext, RowSink, SqlDraft, Storage, StorageError,
};
use nlq_server::config::QueryConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const TENANT: Uuid = Uuid::from_u128(0x1000);
pub const OTHER_TENANT: Uuid = Uuid::from_u128(0x2000);
pub const MANAGER: Uuid = Uuid::from_u128(0x3000);
pub const ALPHA: Uuid = Uuid::from_u128(0x4001);
pub const BETA: Uuid = Uuid::from_u128(0x4002);
pub const GAMMA: Uuid = Uuid::from_u128(0x4003);

pub const COMPLIANCE_SQL: &str = "SELECT d.Name AS DepartmentName, \
     SUM(CASE WHEN a.Status = 'Valid' THEN 1 ELSE 0 END) AS ValidCount, \
     SUM(CASE WHEN a.Status = 'Invalid' THEN 1 ELSE 0 END) AS InvalidCount \
     FROM AuditRecords a \
     JOIN OrganisationUsers ou ON a.UserId = ou.Id \
     JOIN Departments d ON ou.DepartmentId = d.Id \
     WHERE ou.OrganisationId = @TenantId \
     GROUP BY d.Name \
     ORDER BY d.Name";

type Reply = Box<dyn Fn() -> Result<QueryDraft, DraftError> + Send + Sync>;

/// Draft source that always answers with the same scripted reply.
pub struct Scripted {
    reply: Reply,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(reply: impl Fn() -> Result<QueryDraft, DraftError> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn sql(sql: &'static str) -> Self {
        Self::new(move || {
            Ok(QueryDraft::Sql(
                SqlDraft::new(sql).with_explanation("Valid and invalid audits per department"),
            ))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DraftSource for Scripted {
    async fn generate_draft(
        &self,
        _query: &str,
        _context: &RequestContext,
        _cancel: &CancellationToken,
    ) -> Result<QueryDraft, DraftError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

/// Storage wrapper that counts how many statements reached the engine.
pub struct Counting {
    inner: Arc<DuckStore>,
    calls: AtomicUsize,
}

impl Counting {
    pub fn new(inner: Arc<DuckStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Storage for Counting {
    fn stream(
        &self,
        statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stream(statement, interrupt, sink)
    }
}

/// Two tenants. TENANT has Alpha (2 valid, 1 invalid) and Beta (1 valid);
/// OTHER_TENANT has Gamma (5 invalid).
pub fn seeded_store() -> Arc<DuckStore> {
    let store = DuckStore::open_in_memory().unwrap();
    store.bootstrap_schema().unwrap();
    store
        .execute_batch(&format!(
            "INSERT INTO Organisations (Id, Name) VALUES ('{t}', 'Acme'), ('{o}', 'Globex');
             INSERT INTO Departments (Id, Name, OrganisationId) VALUES
                 ('{alpha}', 'Alpha', '{t}'), ('{beta}', 'Beta', '{t}'), ('{gamma}', 'Gamma', '{o}');
             INSERT INTO OrganisationUsers (Id, OrganisationId, DepartmentId) VALUES
                 ('u1', '{t}', '{alpha}'), ('u2', '{t}', '{beta}'), ('u3', '{o}', '{gamma}');
             INSERT INTO AuditRecords (Id, UserId, \"Date\", Status) VALUES
                 ('a1', 'u1', 20240105, 'Valid'),
                 ('a2', 'u1', 20240106, 'Valid'),
                 ('a3', 'u1', 20240107, 'Invalid'),
                 ('a4', 'u2', 20240105, 'Valid'),
                 ('a5', 'u3', 20240105, 'Invalid'),
                 ('a6', 'u3', 20240106, 'Invalid'),
                 ('a7', 'u3', 20240107, 'Invalid'),
                 ('a8', 'u3', 20240108, 'Invalid'),
                 ('a9', 'u3', 20240109, 'Invalid');",
            t = TENANT,
            o = OTHER_TENANT,
            alpha = ALPHA,
            beta = BETA,
            gamma = GAMMA,
        ))
        .unwrap();
    Arc::new(store)
}

pub fn full_access() -> RequestContext {
    RequestContext::new(TENANT)
        .with_identity(MANAGER)
        .with_full_scope_access()
}

pub fn query_config() -> QueryConfig {
    QueryConfig::default()
}

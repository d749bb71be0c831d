//! Executor behaviour against an in-memory DuckDB

use nlq_duck::{DuckStore, ExecutionBudget, ExecutionError, QueryExecutor};
use nlq_guard::{AccessRewriter, ExecutionPlan, Rewrite, RowCapStyle, SqlValidator};
use nlq_ir::{
    BoundStatement, CancellationToken, Interrupt, RequestContext, RowSink, Storage, StorageError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

fn plan_for(sql: &str, context: &RequestContext) -> ExecutionPlan {
    plan_with(sql, BTreeMap::new(), context)
}

fn plan_with(
    sql: &str,
    model_parameters: BTreeMap<String, serde_json::Value>,
    context: &RequestContext,
) -> ExecutionPlan {
    let validated = SqlValidator::default()
        .accept(sql)
        .unwrap_or_else(|r| panic!("rejected: {:?}", r.error_message));
    match AccessRewriter::new(RowCapStyle::Limit, 1000).rewrite(validated, &model_parameters, context) {
        Rewrite::Plan(plan) => plan,
        Rewrite::EmptyScope { .. } => panic!("unexpected empty scope"),
    }
}

fn full_access() -> RequestContext {
    RequestContext::new(Uuid::new_v4())
        .with_identity(Uuid::new_v4())
        .with_full_scope_access()
}

fn numbers_store(count: usize) -> Arc<DuckStore> {
    let store = DuckStore::open_in_memory().unwrap();
    store
        .execute_batch(&format!(
            "CREATE TABLE Numbers AS SELECT range AS n FROM range({count})"
        ))
        .unwrap();
    Arc::new(store)
}

fn executor(storage: Arc<dyn Storage>, max_rows: usize, timeout: Duration) -> QueryExecutor {
    QueryExecutor::new(storage, ExecutionBudget { timeout, max_rows })
}

#[tokio::test]
async fn test_truncates_but_counts_everything() {
    let exec = executor(numbers_store(1500), 1000, Duration::from_secs(30));
    let plan = plan_for("SELECT n FROM Numbers ORDER BY n LIMIT 5000", &full_access());

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(result.rows.len(), 1000);
    assert_eq!(result.total_row_count, 1500);
    assert!(result.was_truncated);
    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows[999]["n"], json!(999));
}

#[tokio::test]
async fn test_exactly_at_cap_is_not_truncated() {
    let exec = executor(numbers_store(1000), 1000, Duration::from_secs(30));
    let plan = plan_for("SELECT n FROM Numbers", &full_access());

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(result.rows.len(), 1000);
    assert_eq!(result.total_row_count, 1000);
    assert!(!result.was_truncated);
}

#[tokio::test]
async fn test_tenant_binding_filters_rows() {
    let store = DuckStore::open_in_memory().unwrap();
    store.bootstrap_schema().unwrap();
    let context = full_access();
    store
        .execute_batch(&format!(
            "INSERT INTO Departments VALUES ('d1', 'IT', '{t}', NULL), ('d2', 'HR', '{t}', NULL), ('d3', 'Ops', 'other', NULL)",
            t = context.tenant_id
        ))
        .unwrap();

    let exec = executor(Arc::new(store), 1000, Duration::from_secs(30));
    let plan = plan_for(
        "SELECT Name, NULL AS Note FROM Departments WHERE OrganisationId = @TenantId ORDER BY Name",
        &context,
    );

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(result.total_row_count, 2);
    assert_eq!(result.rows[0]["Name"], json!("HR"));
    assert!(result.rows[0]["Note"].is_null());
}

#[tokio::test]
async fn test_model_parameters_bind() {
    let exec = executor(numbers_store(50), 1000, Duration::from_secs(30));
    let mut params = BTreeMap::new();
    params.insert("Floor".to_string(), json!(45));
    let plan = plan_with("SELECT n FROM Numbers WHERE n >= @Floor", params, &full_access());

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(result.total_row_count, 5);
}

#[tokio::test]
async fn test_unbound_placeholder_is_bind_error() {
    let exec = executor(numbers_store(10), 1000, Duration::from_secs(30));
    let plan = plan_for("SELECT n FROM Numbers WHERE n > @Missing", &full_access());

    let err = exec.execute(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Bind(_)));
}

#[tokio::test]
async fn test_engine_failure_is_database_error() {
    let exec = executor(numbers_store(10), 1000, Duration::from_secs(30));
    let plan = plan_for("SELECT nope FROM Numbers", &full_access());

    let err = exec.execute(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Database(_)));
}

/// Yields one row every few milliseconds until interrupted.
struct Trickle;

impl Storage for Trickle {
    fn stream(
        &self,
        _statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError> {
        sink.columns(vec!["n".into()]);
        for i in 0..10_000 {
            interrupt.check()?;
            sink.row(vec![json!(i)]);
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_timeout() {
    let exec = executor(Arc::new(Trickle), 1000, Duration::from_millis(100));
    let plan = plan_for("SELECT n FROM Numbers", &full_access());

    let err = exec.execute(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_cancellation() {
    let exec = executor(Arc::new(Trickle), 1000, Duration::from_secs(30));
    let plan = plan_for("SELECT n FROM Numbers", &full_access());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = exec.execute(&plan, &cancel).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Cancelled));
}

#[tokio::test]
async fn test_join_keeps_repeated_column_names_apart() {
    let store = DuckStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE Organisations (Id VARCHAR, Name VARCHAR);
             CREATE TABLE Departments (Id VARCHAR, Name VARCHAR, OrganisationId VARCHAR);
             INSERT INTO Organisations VALUES ('o1', 'Acme');
             INSERT INTO Departments VALUES ('d1', 'IT', 'o1'), ('d2', 'HR', 'o1');",
        )
        .unwrap();
    let exec = executor(Arc::new(store), 1000, Duration::from_secs(30));
    let plan = plan_for(
        "SELECT d.Name, o.Name FROM Departments d \
         JOIN Organisations o ON d.OrganisationId = o.Id ORDER BY d.Name",
        &full_access(),
    );

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    assert_eq!(result.columns, vec!["Name", "Name_2"]);
    assert_eq!(result.rows[0]["Name"], json!("HR"));
    assert_eq!(result.rows[0]["Name_2"], json!("Acme"));
    assert_eq!(result.rows[1]["Name"], json!("IT"));
    for row in &result.rows {
        let keys: Vec<_> = row.keys().cloned().collect();
        assert_eq!(keys, result.columns);
    }
}

#[tokio::test]
async fn test_temporal_and_decimal_cells() {
    let exec = executor(numbers_store(1), 1000, Duration::from_secs(30));
    let plan = plan_for(
        "SELECT CAST(n AS DECIMAL(5,2)) + 1.25 AS d, TIME '10:00:00' AS t, \
         INTERVAL 3 DAY AS iv, ['Valid', 'Invalid'] AS statuses FROM Numbers",
        &full_access(),
    );

    let result = exec.execute(&plan, &CancellationToken::new()).await.unwrap();
    let row = &result.rows[0];
    assert_eq!(row["d"], json!(1.25));
    assert_eq!(row["t"], json!("10:00:00"));
    assert_eq!(row["iv"], json!("3 days"));
    assert_eq!(row["statuses"], json!(["Valid", "Invalid"]));
}

/// Records when the wrapped engine call returned.
struct Released {
    inner: DuckStore,
    at: Mutex<Option<Instant>>,
}

impl Storage for Released {
    fn stream(
        &self,
        statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError> {
        let result = self.inner.stream(statement, interrupt, sink);
        *self.at.lock().unwrap() = Some(Instant::now());
        result
    }
}

#[tokio::test]
async fn test_timeout_releases_the_engine() {
    let released = Arc::new(Released {
        inner: DuckStore::open_in_memory().unwrap(),
        at: Mutex::new(None),
    });
    let exec = executor(released.clone(), 1000, Duration::from_millis(200));
    let plan = plan_for(
        "SELECT SUM(range % 7) AS s FROM range(20000000000)",
        &full_access(),
    );

    let err = exec.execute(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_timeout());

    let timed_out = Instant::now();
    loop {
        if let Some(at) = *released.at.lock().unwrap() {
            let lingered = at.saturating_duration_since(timed_out);
            assert!(lingered < Duration::from_secs(2), "engine ran {:?} past the timeout", lingered);
            break;
        }
        assert!(
            timed_out.elapsed() < Duration::from_secs(5),
            "engine still running after the timeout"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_cancellation_releases_the_engine() {
    let released = Arc::new(Released {
        inner: DuckStore::open_in_memory().unwrap(),
        at: Mutex::new(None),
    });
    let exec = executor(released.clone(), 1000, Duration::from_secs(60));
    let plan = plan_for(
        "SELECT SUM(range % 7) AS s FROM range(20000000000)",
        &full_access(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = exec.execute(&plan, &cancel).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Cancelled));

    let cancelled = Instant::now();
    while released.at.lock().unwrap().is_none() {
        assert!(
            cancelled.elapsed() < Duration::from_secs(5),
            "engine still running after cancellation"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

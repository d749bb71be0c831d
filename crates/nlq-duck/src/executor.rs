//! Bounded, cancellable execution of access plans

use nlq_guard::ExecutionPlan;
use nlq_ir::{
    unique_column_names, CancellationToken, Interrupt, ResultSet, Row, RowSink, Storage,
    StorageError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::bind::bind_named;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Parameter binding failed: {0}")]
    Bind(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionBudget {
    pub timeout: Duration,
    pub max_rows: usize,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_rows: 1000,
        }
    }
}

/// Buffers at most `max_rows` rows while counting every row the engine yields.
#[derive(Debug)]
pub struct BoundedCollector {
    max_rows: usize,
    columns: Vec<String>,
    rows: Vec<Row>,
    total: usize,
}

impl BoundedCollector {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            columns: Vec::new(),
            rows: Vec::new(),
            total: 0,
        }
    }

    pub fn finish(self, elapsed: Duration) -> ResultSet {
        ResultSet {
            columns: self.columns,
            rows: self.rows,
            total_row_count: self.total,
            was_truncated: self.total > self.max_rows,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

impl RowSink for BoundedCollector {
    fn columns(&mut self, columns: Vec<String>) {
        self.columns = unique_column_names(columns);
    }

    fn row(&mut self, values: Vec<serde_json::Value>) {
        self.total += 1;
        if self.rows.len() < self.max_rows {
            let row: Row = self.columns.iter().cloned().zip(values).collect();
            self.rows.push(row);
        }
    }
}

/// Trips the interrupt when dropped unless the statement completed.
struct AbortOnDrop(Option<Interrupt>);

impl AbortOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(interrupt) = self.0.take() {
            interrupt.trip();
        }
    }
}

pub struct QueryExecutor {
    storage: Arc<dyn Storage>,
    budget: ExecutionBudget,
}

impl QueryExecutor {
    pub fn new(storage: Arc<dyn Storage>, budget: ExecutionBudget) -> Self {
        Self { storage, budget }
    }

    pub fn budget(&self) -> ExecutionBudget {
        self.budget
    }

    /// Run `plan` under the configured budget.
    ///
    /// The engine call runs on the blocking pool. Whichever comes first of
    /// completion, the timeout, or `cancel` decides the outcome. Returning
    /// early for any reason, including being dropped, aborts the statement.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
    ) -> Result<ResultSet, ExecutionError> {
        let started = Instant::now();
        let statement = bind_named(plan.sql(), plan.parameters())?;

        let stop = cancel.child_token();
        let interrupt = Interrupt::new(self.budget.timeout, stop);
        let guard = AbortOnDrop(Some(interrupt.clone()));
        let storage = Arc::clone(&self.storage);
        let max_rows = self.budget.max_rows;

        let task = tokio::task::spawn_blocking(move || {
            let mut collector = BoundedCollector::new(max_rows);
            storage
                .stream(&statement, &interrupt, &mut collector)
                .map(|_| collector)
        });

        let joined = tokio::select! {
            joined = task => joined,
            _ = tokio::time::sleep(self.budget.timeout) => {
                return Err(ExecutionError::Timeout(self.budget.timeout));
            }
            _ = cancel.cancelled() => {
                return Err(ExecutionError::Cancelled);
            }
        };
        guard.disarm();

        let collector = joined
            .map_err(|e| ExecutionError::Database(format!("Execution task failed: {}", e)))?
            .map_err(|e| match e {
                StorageError::Timeout => ExecutionError::Timeout(self.budget.timeout),
                other => ExecutionError::from(other),
            })?;

        let result = collector.finish(started.elapsed());
        tracing::debug!(
            rows = result.total_row_count,
            truncated = result.was_truncated,
            elapsed_ms = result.elapsed_ms,
            fingerprint = %plan.fingerprint(),
            "Statement executed"
        );
        Ok(result)
    }
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout => ExecutionError::Timeout(Duration::ZERO),
            StorageError::Cancelled => ExecutionError::Cancelled,
            StorageError::Bind(msg) => ExecutionError::Bind(msg),
            StorageError::Engine(msg) => ExecutionError::Database(msg),
        }
    }
}

//! Storage engine boundary
//!
//! The engine accepts a positional statement and pushes its schema and rows
//! into a [`RowSink`]. Engines are blocking; callers run them on a blocking
//! thread and stop them through the shared [`Interrupt`].

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ParamValue;

/// Statement text with `?` markers and the values for them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<ParamValue>,
}

type AbortFn = Box<dyn Fn() + Send + Sync>;

/// Deadline and cancellation signal observed by a running statement.
///
/// Row-at-a-time engines poll [`Interrupt::check`]. An engine that can block
/// inside a single call also registers an abort hook, which [`Interrupt::trip`]
/// fires.
#[derive(Clone)]
pub struct Interrupt {
    deadline: Instant,
    cancel: CancellationToken,
    abort: Arc<Mutex<Option<AbortFn>>>,
}

impl Interrupt {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
            abort: Arc::new(Mutex::new(None)),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Fails once the caller cancelled or the deadline passed.
    pub fn check(&self) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(StorageError::Timeout);
        }
        Ok(())
    }

    /// Install the hook that stops the engine mid-statement.
    ///
    /// Runs it immediately when the interrupt has already tripped.
    pub fn on_abort(&self, abort: impl Fn() + Send + Sync + 'static) {
        let mut slot = self.abort.lock();
        if self.cancel.is_cancelled() {
            drop(slot);
            abort();
            return;
        }
        *slot = Some(Box::new(abort));
    }

    pub fn clear_abort(&self) {
        self.abort.lock().take();
    }

    /// Cancel, and stop whatever statement the engine is running.
    pub fn trip(&self) {
        self.cancel.cancel();
        if let Some(abort) = self.abort.lock().as_ref() {
            abort();
        }
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("armed", &self.abort.lock().is_some())
            .finish()
    }
}

/// Rename repeated column names to `Name_2`, `Name_3`, ... so every column
/// owns its own key in a row map. The first occurrence keeps its name.
pub fn unique_column_names(columns: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = columns.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
    columns
        .into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}", name, n);
                if taken.insert(candidate.clone()) {
                    seen.insert(candidate.clone());
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Receives a statement's output. `columns` is pushed once, before the first row.
pub trait RowSink {
    fn columns(&mut self, columns: Vec<String>);
    fn row(&mut self, values: Vec<serde_json::Value>);
}

pub trait Storage: Send + Sync {
    /// Run a read-only statement, streaming into `sink` until exhausted.
    fn stream(
        &self,
        statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Statement exceeded its time limit")]
    Timeout,

    #[error("Statement cancelled")]
    Cancelled,

    #[error("Parameter binding failed: {0}")]
    Bind(String),

    #[error("Storage engine error: {0}")]
    Engine(String),
}

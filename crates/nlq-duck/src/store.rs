//! DuckDB storage engine

use duckdb::{params_from_iter, Connection};
use nlq_ir::{BoundStatement, Interrupt, RowSink, Storage, StorageError};
use parking_lot::Mutex;
use std::path::Path;

use crate::catalog::SchemaCatalog;
use crate::schema::{NLP_QUERY_LOGS_DDL, REPORTING_SCHEMA};
use crate::value::{cell_to_json, to_duck_value};

/// One DuckDB database shared by every request.
///
/// Each statement runs on its own cloned connection, so concurrent requests do
/// not serialize on the root handle beyond the clone itself.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    pub fn open<P: AsRef<Path>>(path: P) -> duckdb::Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> duckdb::Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// A fresh connection to the same database.
    pub fn connect(&self) -> duckdb::Result<Connection> {
        self.conn.lock().try_clone()
    }

    /// Run setup or fixture SQL directly, bypassing the guard.
    pub fn execute_batch(&self, sql: &str) -> duckdb::Result<()> {
        self.conn.lock().execute_batch(sql)
    }

    /// Create the reporting tables that do not exist yet.
    pub fn bootstrap_schema(&self) -> duckdb::Result<()> {
        self.execute_batch(REPORTING_SCHEMA)?;
        self.execute_batch(NLP_QUERY_LOGS_DDL)
    }

    pub fn catalog(&self, allowed_tables: &[String]) -> duckdb::Result<SchemaCatalog> {
        SchemaCatalog::load(&self.connect()?, allowed_tables)
    }
}

fn engine(err: duckdb::Error) -> StorageError {
    StorageError::Engine(err.to_string())
}

impl DuckStore {
    fn run(
        conn: &Connection,
        statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError> {
        // An interrupted statement fails inside the engine; report why it stopped.
        let fail = |err: duckdb::Error| interrupt.check().err().unwrap_or_else(|| engine(err));

        let mut stmt = conn.prepare(&statement.sql).map_err(fail)?;
        let values: Vec<_> = statement.values.iter().map(to_duck_value).collect();
        let mut rows = stmt.query(params_from_iter(values)).map_err(fail)?;

        let columns = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();
        let width = columns.len();
        sink.columns(columns);

        while let Some(row) = rows.next().map_err(fail)? {
            interrupt.check()?;

            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(cell_to_json(row, idx).map_err(fail)?);
            }
            sink.row(cells);
        }

        Ok(())
    }
}

impl Storage for DuckStore {
    fn stream(
        &self,
        statement: &BoundStatement,
        interrupt: &Interrupt,
        sink: &mut dyn RowSink,
    ) -> Result<(), StorageError> {
        interrupt.check()?;

        let conn = self.connect().map_err(engine)?;
        let handle = conn.interrupt_handle();
        interrupt.on_abort(move || handle.interrupt());

        let result = interrupt
            .check()
            .and_then(|_| Self::run(&conn, statement, interrupt, sink));
        interrupt.clear_abort();
        result
    }
}

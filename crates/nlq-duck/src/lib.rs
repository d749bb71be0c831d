//! DuckDB adapters for the NLQ pipeline
//!
//! - [`DuckStore`]: the [`nlq_ir::Storage`] engine over one shared database
//! - [`QueryExecutor`]: bounded, cancellable execution of an access plan
//! - [`DuckAuditLog`]: `NlpQueryLogs` persistence
//! - [`DuckScopeDirectory`]: manager scope facts
//! - [`SchemaCatalog`]: allowed-table schema for the draft prompt
//! - [`DuckReferenceData`]: status values, date range and department names for the prompt

mod audit;
mod bind;
mod catalog;
mod directory;
mod executor;
mod reference;
mod schema;
mod store;
mod value;

pub use audit::DuckAuditLog;
pub use bind::bind_named;
pub use catalog::{ColumnInfo, SchemaCatalog, TableCatalog};
pub use directory::DuckScopeDirectory;
pub use executor::{BoundedCollector, ExecutionBudget, ExecutionError, QueryExecutor};
pub use reference::DuckReferenceData;
pub use schema::REPORTING_SCHEMA;
pub use store::DuckStore;

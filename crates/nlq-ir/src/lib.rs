//! NLQ shared model
//!
//! Types that flow through the natural-language query pipeline, plus the
//! traits implemented by its external collaborators: the draft source (LLM),
//! the authorization resolver, the storage engine and the audit store.

mod access;
mod audit;
mod context;
mod draft;
mod reference;
mod result;
mod storage;
mod value;

pub use access::{resolve_context, AccessError, AccessResolver, ScopeDirectory};
pub use audit::{AuditError, AuditLog, AuditRecord, MemoryAuditLog};
pub use context::{Claims, RequestContext};
pub use draft::{DraftError, DraftSource, QueryDraft, SqlDraft};
pub use reference::{DepartmentRef, LookupError, ReferenceData, ReferenceFacts};
pub use result::{ResultSet, Row};
pub use storage::{unique_column_names, BoundStatement, Interrupt, RowSink, Storage, StorageError};
pub use value::ParamValue;

/// Re-exported so collaborators do not need their own tokio-util dependency.
pub use tokio_util::sync::CancellationToken;

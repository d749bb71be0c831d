//! Guards between a model-drafted statement and the database
//!
//! - [`SqlValidator`] statically rejects unsafe statement shapes
//! - [`AccessRewriter`] caps rows and binds the caller's authorization scope
//! - [`RateLimiter`] admits callers on a sliding one-minute window

mod limiter;
mod patterns;
mod policy;
mod rewrite;
mod validate;

pub use limiter::{Admission, RateLimiter, MIN_TRACKED_IDENTITIES, RATE_WINDOW, RETRY_AFTER};
pub use policy::{GuardPolicy, FORBIDDEN_COLUMNS, FORBIDDEN_KEYWORDS};
pub use rewrite::{
    is_reserved_parameter, AccessRewriter, ExecutionPlan, Rewrite, RowCapStyle, IDENTITY_PARAM,
    SUB_SCOPE_PARAM_PREFIX, TENANT_PARAM,
};
pub use validate::{SqlValidator, ValidatedSql, ValidationResult};

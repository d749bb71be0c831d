//! Reference data shown to the draft source alongside the schema

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::RequestContext;

#[derive(Debug, Error)]
#[error("Reference lookup failed: {0}")]
pub struct LookupError(pub String);

/// A department the caller may see. `placeholder` is the `SubScopeId<n>`
/// parameter it is bound to, when the caller is scoped to departments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentRef {
    pub id: Uuid,
    pub name: String,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFacts {
    /// Distinct audit record statuses within the caller's tenant.
    pub status_values: Vec<String>,

    /// Earliest and latest audit `Date` (yyyyMMdd) within the caller's tenant.
    pub date_range: Option<(i64, i64)>,

    pub departments: Vec<DepartmentRef>,
}

impl ReferenceFacts {
    pub fn is_empty(&self) -> bool {
        self.status_values.is_empty() && self.date_range.is_none() && self.departments.is_empty()
    }
}

#[async_trait]
pub trait ReferenceData: Send + Sync {
    /// Facts restricted to what `context` may see.
    async fn facts(&self, context: &RequestContext) -> Result<ReferenceFacts, LookupError>;
}


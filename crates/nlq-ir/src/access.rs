//! Authorization collaborator

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{Claims, RequestContext};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Caller is not associated with a tenant")]
    NoTenant,

    #[error("Caller is not associated with an identity")]
    NoIdentity,

    #[error("Caller may not act within tenant {0}")]
    TenantDenied(Uuid),

    #[error("Scope lookup failed: {0}")]
    Lookup(String),
}

/// Answers the three authorization questions the pipeline needs.
#[async_trait]
pub trait AccessResolver: Send + Sync {
    async fn can_act_within(&self, claims: &Claims, tenant_id: Uuid) -> bool;

    async fn has_full_scope_access(&self, claims: &Claims) -> Result<bool, AccessError>;

    async fn accessible_sub_scope_ids(&self, claims: &Claims) -> Result<Vec<Uuid>, AccessError>;
}

/// Stored scope facts for an identity, consulted when claims carry none.
#[async_trait]
pub trait ScopeDirectory: Send + Sync {
    async fn manages_all_sub_scopes(&self, identity_id: Uuid) -> Result<bool, AccessError>;

    async fn sub_scope_ids(&self, identity_id: Uuid) -> Result<Vec<Uuid>, AccessError>;
}

/// Build the immutable [`RequestContext`] for a caller.
pub async fn resolve_context(
    resolver: &dyn AccessResolver,
    claims: &Claims,
) -> Result<RequestContext, AccessError> {
    let tenant_id = claims.tenant_id.ok_or(AccessError::NoTenant)?;
    let identity_id = claims.identity_id.ok_or(AccessError::NoIdentity)?;

    if !resolver.can_act_within(claims, tenant_id).await {
        return Err(AccessError::TenantDenied(tenant_id));
    }

    let context = RequestContext::new(tenant_id).with_identity(identity_id);
    if resolver.has_full_scope_access(claims).await? {
        return Ok(context.with_full_scope_access());
    }

    let sub_scopes = resolver.accessible_sub_scope_ids(claims).await?;
    Ok(context.with_sub_scopes(sub_scopes))
}

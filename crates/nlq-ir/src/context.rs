//! Caller identity and authorization facts

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use uuid::Uuid;

/// Authorization scope of one request.
///
/// Built once per request by an [`AccessResolver`](crate::AccessResolver) and
/// never persisted. Sub-scope ids are kept ordered so parameter binding is
/// deterministic (`SubScopeId0`, `SubScopeId1`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub identity_id: Option<Uuid>,
    pub has_full_scope_access: bool,
    pub accessible_sub_scope_ids: BTreeSet<Uuid>,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            identity_id: None,
            has_full_scope_access: false,
            accessible_sub_scope_ids: BTreeSet::new(),
        }
    }

    pub fn with_identity(mut self, identity_id: Uuid) -> Self {
        self.identity_id = Some(identity_id);
        self
    }

    pub fn with_full_scope_access(mut self) -> Self {
        self.has_full_scope_access = true;
        self
    }

    pub fn with_sub_scopes<I: IntoIterator<Item = Uuid>>(mut self, ids: I) -> Self {
        self.accessible_sub_scope_ids.extend(ids);
        self
    }

    /// True when the caller can see at least some data in the tenant.
    pub fn has_visible_scope(&self) -> bool {
        self.has_full_scope_access || !self.accessible_sub_scope_ids.is_empty()
    }
}

/// Claims asserted for a caller by the upstream authentication layer.
///
/// Every field is optional because the gateway may only know part of the
/// picture; the resolver fills the gaps from its directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub identity_id: Option<Uuid>,
    pub full_scope_access: Option<bool>,
    pub sub_scope_ids: Vec<Uuid>,
    pub remote_addr: Option<IpAddr>,
}

impl Claims {
    /// Key used for per-caller admission control.
    ///
    /// Strongest signal wins: identity id, then subject, then network origin,
    /// then a shared anonymous bucket.
    pub fn rate_limit_key(&self) -> String {
        if let Some(id) = self.identity_id {
            return id.to_string();
        }
        if let Some(subject) = self.subject.as_deref().filter(|s| !s.is_empty()) {
            return subject.to_string();
        }
        if let Some(addr) = self.remote_addr {
            return addr.to_string();
        }
        "anonymous".to_string()
    }
}

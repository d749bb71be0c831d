//! Caller claims and scope resolution
//!
//! Authentication happens in front of this server. The gateway forwards the
//! verified caller as headers; this module turns them into [`Claims`] and
//! answers the resolver questions from them, falling back to the scope
//! directory for facts the claims do not carry.

use async_trait::async_trait;
use axum::http::HeaderMap;
use nlq_ir::{AccessError, AccessResolver, Claims, ScopeDirectory};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const IDENTITY_HEADER: &str = "x-identity-id";
pub const SUBJECT_HEADER: &str = "x-subject";
pub const FULL_SCOPE_HEADER: &str = "x-full-scope-access";
pub const SUB_SCOPES_HEADER: &str = "x-sub-scope-ids";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_uuid(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    let raw = header(headers, name)?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(header = name, "Ignoring malformed id header");
            None
        }
    }
}

/// Build claims from gateway headers. Malformed values are dropped.
pub fn claims_from_headers(headers: &HeaderMap, remote_addr: Option<IpAddr>) -> Claims {
    let full_scope_access = header(headers, FULL_SCOPE_HEADER).and_then(|v| {
        match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    });

    let sub_scope_ids = header(headers, SUB_SCOPES_HEADER)
        .map(|v| {
            v.split(',')
                .filter_map(|part| Uuid::parse_str(part.trim()).ok())
                .collect()
        })
        .unwrap_or_default();

    Claims {
        subject: header(headers, SUBJECT_HEADER).map(str::to_string),
        tenant_id: parse_uuid(headers, TENANT_HEADER),
        identity_id: parse_uuid(headers, IDENTITY_HEADER),
        full_scope_access,
        sub_scope_ids,
        remote_addr,
    }
}

/// Claims-first resolver with an optional stored-scope fallback.
#[derive(Default, Clone)]
pub struct ClaimsResolver {
    directory: Option<Arc<dyn ScopeDirectory>>,
}

impl ClaimsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(directory: Arc<dyn ScopeDirectory>) -> Self {
        Self {
            directory: Some(directory),
        }
    }
}

#[async_trait]
impl AccessResolver for ClaimsResolver {
    async fn can_act_within(&self, claims: &Claims, tenant_id: Uuid) -> bool {
        claims.tenant_id == Some(tenant_id)
    }

    async fn has_full_scope_access(&self, claims: &Claims) -> Result<bool, AccessError> {
        if let Some(flag) = claims.full_scope_access {
            return Ok(flag);
        }
        match (&self.directory, claims.identity_id) {
            (Some(directory), Some(identity)) => directory.manages_all_sub_scopes(identity).await,
            _ => Ok(false),
        }
    }

    async fn accessible_sub_scope_ids(&self, claims: &Claims) -> Result<Vec<Uuid>, AccessError> {
        if !claims.sub_scope_ids.is_empty() {
            return Ok(claims.sub_scope_ids.clone());
        }
        match (&self.directory, claims.identity_id) {
            (Some(directory), Some(identity)) => directory.sub_scope_ids(identity).await,
            _ => Ok(Vec::new()),
        }
    }
}

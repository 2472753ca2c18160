//! Access sessions and the registry that tracks them.
//!
//! ## Lifecycle
//!
//! ```text
//! Requested
//!   │
//!   ├─► Provisioning   (service account applied, waiting until queryable)
//!   │
//!   ├─► Active         (token issued, session registered)
//!   │
//!   ├─► Expired        (expires_at has passed, waiting for the sweep)
//!   │
//!   └─► Revoked        (binding + service account deleted, or shared)
//! ```

mod registry;

pub use registry::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to a sanitized principal to name its service account.
pub const IDENTITY_SUFFIX: &str = "-user";

/// A granted, time-bounded access window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSession {
    /// Unique per activation; the registry key.
    pub session_id: String,
    /// Service account name, shared by every session of the same principal.
    pub name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub server_url: String,
    pub principal: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessSession {
    /// Name of the cluster role binding paired with this session's identity.
    pub fn binding_name(&self) -> String {
        binding_name(&self.name)
    }

    /// Context name as written into kubeconfig documents.
    pub fn context_name(&self) -> String {
        format!("{}@{}", self.name, self.cluster_name)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left until expiry, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }
}

/// Derive the service account name for a principal.
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with `-`, collapses
/// repeated dashes and appends `-user`.
pub fn identity_name(principal: &str) -> crate::Result<String> {
    let mut sanitized = String::with_capacity(principal.len());
    for c in principal.to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }
    let sanitized = sanitized.trim_matches('-');

    if sanitized.is_empty() {
        return Err(crate::Error::InvalidName(format!(
            "principal {:?} has no usable characters",
            principal
        )));
    }

    Ok(format!("{}{}", sanitized, IDENTITY_SUFFIX))
}

/// Name of the cluster role binding for a service account.
pub fn binding_name(identity: &str) -> String {
    format!("{}-admin", identity)
}

/// Generate a fresh session id for an identity.
pub fn new_session_id(identity: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", identity, &id[..8])
}

/// Recover the principal from a service account name.
pub fn principal_from_identity(identity: &str) -> &str {
    identity.strip_suffix(IDENTITY_SUFFIX).unwrap_or(identity)
}

#[cfg(test)]
pub(crate) fn test_session(principal: &str, ttl: chrono::Duration) -> AccessSession {
    let name = identity_name(principal).unwrap();
    let now = Utc::now();
    AccessSession {
        session_id: new_session_id(&name),
        name,
        namespace: "kube-system".to_string(),
        cluster_name: "test-cluster".to_string(),
        server_url: "https://127.0.0.1:6443".to_string(),
        principal: principal.to_string(),
        created_at: now,
        expires_at: now + ttl,
    }
}

//! Creation and teardown of temporary cluster identities.
//!
//! A grant is a ServiceAccount plus a ClusterRoleBinding to `cluster-admin`.
//! Grants are shared by every session of a principal: creating one that
//! already exists is a no-op, and only the last session to end deletes it.

use crate::config::SessionConfig;
use crate::control_plane::{
    ControlPlaneClient, KIND_CLUSTER_ROLE_BINDING, KIND_SERVICE_ACCOUNT, manifest,
};
use crate::error::{Error, Result};
use crate::session::{self, AccessSession, RevocationDecision, SessionRegistry};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capabilities the caller needs before we try to create anything.
const REQUIRED_CAPABILITIES: &[(&str, &str)] = &[
    ("create", KIND_SERVICE_ACCOUNT),
    ("create", KIND_CLUSTER_ROLE_BINDING),
];

/// What `revoke_grant` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// Binding and service account were deleted.
    Revoked,
    /// Another session of the principal still needs the grant.
    Shared,
    /// A concurrent revocation is already deleting the grant.
    AlreadyRevoking,
}

/// Poll until a service account is queryable.
///
/// Checks `attempts` times, sleeping `interval` between misses.
pub(crate) async fn wait_for_identity(
    client: &dyn ControlPlaneClient,
    name: &str,
    namespace: &str,
    attempts: u32,
    interval: Duration,
) -> Result<()> {
    for attempt in 1..=attempts {
        match client.get(KIND_SERVICE_ACCOUNT, name, Some(namespace)).await {
            Ok(true) => {
                debug!(name = %name, attempt, "Service account is visible");
                return Ok(());
            }
            Ok(false) => {}
            // A failed read is treated like "not visible yet"
            Err(e) => debug!(name = %name, attempt, error = %e, "Service account lookup failed"),
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::TimeoutWaitingForConsistency(format!(
        "service account {}/{} not visible after {} attempts",
        namespace, name, attempts
    )))
}

/// Creates and destroys the cluster-side resources behind sessions.
pub struct AccessGrantManager {
    client: Arc<dyn ControlPlaneClient>,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
    host: String,
}

impl AccessGrantManager {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        registry: Arc<SessionRegistry>,
        config: SessionConfig,
    ) -> Self {
        Self {
            client,
            registry,
            config,
            host: manifest::local_host(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create (or confirm) the grant for `principal`, bounded by `deadline`.
    ///
    /// A deadline overrun is reported as `TimeoutWaitingForConsistency`.
    pub async fn create_grant(
        &self,
        principal: &str,
        ttl: chrono::Duration,
        deadline: Duration,
    ) -> Result<AccessSession> {
        match tokio::time::timeout(deadline, self.create_grant_inner(principal, ttl)).await {
            Ok(result) => result,
            Err(_) => Err(Error::TimeoutWaitingForConsistency(format!(
                "creating grant for {} exceeded {}s deadline",
                principal,
                deadline.as_secs_f64()
            ))),
        }
    }

    async fn create_grant_inner(
        &self,
        principal: &str,
        ttl: chrono::Duration,
    ) -> Result<AccessSession> {
        info!(principal = %principal, "Creating temporary access");

        for (verb, kind) in REQUIRED_CAPABILITIES {
            if !self.client.probe_capability(verb, kind).await? {
                return Err(Error::PermissionDenied {
                    verb: verb.to_string(),
                    resource: kind.to_string(),
                });
            }
        }

        let cluster = self.client.read_active_cluster_identity().await?;
        let name = session::identity_name(principal)?;

        let effective_ttl = self.config.clamp_ttl(ttl);
        if effective_ttl != ttl {
            warn!(
                requested_secs = ttl.num_seconds(),
                effective_secs = effective_ttl.num_seconds(),
                "Adjusted session duration to allowed range"
            );
        }

        let now = Utc::now();
        let session = AccessSession {
            session_id: session::new_session_id(&name),
            name,
            namespace: self.config.namespace.clone(),
            cluster_name: cluster.cluster_name,
            server_url: cluster.server_url,
            principal: principal.to_string(),
            created_at: now,
            expires_at: now + effective_ttl,
        };

        if self
            .client
            .get(KIND_SERVICE_ACCOUNT, &session.name, Some(&session.namespace))
            .await?
        {
            info!(name = %session.name, "Service account already exists, reusing it");
            return Ok(session);
        }

        let manifest = manifest::render_grant(&session, &self.host)?;
        debug!("Creating resources:\n{}", manifest);
        self.client.apply(&manifest).await?;

        wait_for_identity(
            self.client.as_ref(),
            &session.name,
            &session.namespace,
            self.config.poll_attempts,
            self.config.poll_interval(),
        )
        .await?;

        info!(
            name = %session.name,
            session_id = %session.session_id,
            "Temporary access created"
        );
        Ok(session)
    }

    /// End `session` and delete its grant if no other session needs it.
    ///
    /// Deletion failures are collected into `PartialCleanupFailure`; the
    /// session is considered revoked either way.
    pub async fn revoke_grant(&self, session: &AccessSession) -> Result<RevokeOutcome> {
        let claim = match self.registry.claim_revocation(session, Utc::now()) {
            RevocationDecision::Claimed(claim) => claim,
            RevocationDecision::Shared => {
                info!(
                    principal = %session.principal,
                    session_id = %session.session_id,
                    "Other sessions still active, keeping grant"
                );
                return Ok(RevokeOutcome::Shared);
            }
            RevocationDecision::InProgress => {
                debug!(principal = %session.principal, "Grant already being revoked");
                return Ok(RevokeOutcome::AlreadyRevoking);
            }
        };

        let mut errors = Vec::new();

        // Binding first so it never outlives the identity it points at
        let binding = session.binding_name();
        if let Err(e) = self
            .client
            .delete(KIND_CLUSTER_ROLE_BINDING, &binding, None, true)
            .await
        {
            errors.push(format!("failed to delete clusterrolebinding {}: {}", binding, e));
        }

        if let Err(e) = self
            .client
            .delete(
                KIND_SERVICE_ACCOUNT,
                &session.name,
                Some(&session.namespace),
                true,
            )
            .await
        {
            errors.push(format!(
                "failed to delete serviceaccount {}/{}: {}",
                session.namespace, session.name, e
            ));
        }

        drop(claim);

        if errors.is_empty() {
            info!(name = %session.name, "Cleaned up service account");
            Ok(RevokeOutcome::Revoked)
        } else {
            Err(Error::PartialCleanupFailure(errors))
        }
    }

    /// Delete `principal`'s grant after an activation failed before it
    /// produced a session, unless another session still needs it.
    ///
    /// Covers grants left behind by a partial create as well as revocations
    /// that were skipped while the failed activation was in flight.
    pub async fn release(&self, principal: &str) -> Result<RevokeOutcome> {
        let name = session::identity_name(principal)?;
        let now = Utc::now();
        let placeholder = AccessSession {
            session_id: session::new_session_id(&name),
            name,
            namespace: self.config.namespace.clone(),
            cluster_name: String::new(),
            server_url: String::new(),
            principal: principal.to_string(),
            created_at: now,
            expires_at: now,
        };
        self.revoke_grant(&placeholder).await
    }
}

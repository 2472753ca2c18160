//! AccessService - activation and deactivation flows
//!
//! Wires the registry, grant manager, token issuer and cleanup scheduler
//! together around one control plane client.

use crate::cleanup::CleanupScheduler;
use crate::config::SessionConfig;
use crate::control_plane::ControlPlaneClient;
use crate::error::Result;
use crate::grant::{AccessGrantManager, RevokeOutcome};
use crate::session::{AccessSession, SessionRegistry};
use crate::token::{Token, TokenIssuer};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AccessService {
    registry: Arc<SessionRegistry>,
    grants: Arc<AccessGrantManager>,
    issuer: TokenIssuer,
    config: SessionConfig,
}

impl AccessService {
    pub fn new(client: Arc<dyn ControlPlaneClient>, config: SessionConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let grants = Arc::new(AccessGrantManager::new(
            Arc::clone(&client),
            Arc::clone(&registry),
            config.clone(),
        ));
        let issuer = TokenIssuer::new(client, config.clone());
        Self {
            registry,
            grants,
            issuer,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Grant `principal` access for `ttl` and register the session.
    ///
    /// On any failure the grant is rolled back, unless another session of
    /// the principal still uses it. A deactivation that was skipped while
    /// this activation was in flight is completed by that rollback.
    pub async fn activate(
        &self,
        principal: &str,
        ttl: chrono::Duration,
    ) -> Result<(AccessSession, Token)> {
        let ticket = self.registry.begin_provisioning(principal).await;

        let created = self
            .grants
            .create_grant(principal, ttl, self.config.grant_deadline())
            .await;
        let mut session = match created {
            Ok(session) => session,
            Err(e) => {
                drop(ticket);
                if let Err(cleanup) = self.grants.release(principal).await {
                    warn!(principal = %principal, error = %cleanup, "Rollback incomplete");
                }
                return Err(e);
            }
        };

        let token = match self.issuer.issue_token(&mut session).await {
            Ok(token) => token,
            Err(e) => {
                drop(ticket);
                if let Err(cleanup) = self.grants.revoke_grant(&session).await {
                    warn!(principal = %principal, error = %cleanup, "Rollback incomplete");
                }
                return Err(e);
            }
        };

        self.registry.register(session.clone())?;
        drop(ticket);

        info!(
            principal = %principal,
            session_id = %session.session_id,
            expires_at = %session.expires_at,
            "Session active"
        );
        Ok((session, token))
    }

    /// End a session and revoke its grant if nothing else needs it.
    pub async fn deactivate(&self, session: &AccessSession) -> Result<RevokeOutcome> {
        let outcome = self.grants.revoke_grant(session).await;
        self.registry.remove(&session.session_id);
        outcome
    }

    /// Scheduler sweeping this service's registry.
    pub fn scheduler(&self) -> Arc<CleanupScheduler> {
        Arc::new(CleanupScheduler::new(
            Arc::clone(&self.grants),
            self.config.sweep_interval(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{
        InMemoryControlPlane, KIND_CLUSTER_ROLE_BINDING, KIND_SERVICE_ACCOUNT,
    };
    use crate::error::Error;
    use crate::token::expiry;
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;

    fn setup() -> (Arc<InMemoryControlPlane>, Arc<AccessService>) {
        let plane = Arc::new(InMemoryControlPlane::new());
        let config = SessionConfig {
            poll_interval_ms: 1,
            ..SessionConfig::default()
        };
        let service = Arc::new(AccessService::new(plane.clone(), config));
        (plane, service)
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let (plane, service) = setup();
        let now = Utc::now();

        let (session, token) = service.activate("alice", Duration::hours(1)).await.unwrap();
        assert_eq!(session.name, "alice-user");
        assert_eq!(session.namespace, "kube-system");
        assert!(((session.expires_at - now).num_seconds() - 3600).abs() <= 2);

        let entries = service.registry().snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], session);

        assert_eq!(token.as_str().split('.').count(), 3);
        let exp = expiry::decode_expiry(token.as_str()).unwrap();
        assert!((exp - (now.timestamp() + 3600)).abs() <= 60);

        let outcome = service.deactivate(&session).await.unwrap();
        assert_eq!(outcome, RevokeOutcome::Revoked);
        assert_eq!(
            plane.deleted(),
            vec![
                (KIND_CLUSTER_ROLE_BINDING.to_string(), "alice-user-admin".to_string()),
                (KIND_SERVICE_ACCOUNT.to_string(), "alice-user".to_string()),
            ]
        );
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_short_activation_registers_clamped_expiry() {
        let (_plane, service) = setup();
        let (session, token) = service.activate("alice", Duration::minutes(3)).await.unwrap();

        assert!(session.expires_at - Utc::now() > Duration::minutes(9));
        assert_eq!(service.registry().get(&session.session_id).unwrap(), session);
        assert!((token.expires_at() - session.expires_at).num_seconds().abs() <= 60);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_share_grant() {
        let (plane, service) = setup();
        let (first, _) = service.activate("alice", Duration::hours(1)).await.unwrap();
        let (second, _) = service.activate("alice", Duration::hours(2)).await.unwrap();

        assert_eq!(plane.apply_calls(), 1);
        assert_eq!(service.registry().len(), 2);

        assert_eq!(service.deactivate(&first).await.unwrap(), RevokeOutcome::Shared);
        assert!(plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));

        assert_eq!(service.deactivate(&second).await.unwrap(), RevokeOutcome::Revoked);
        assert!(!plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
    }

    #[tokio::test]
    async fn test_token_mismatch_rolls_back_grant() {
        let (plane, service) = setup();
        plane.set_token_skew(-7200);

        let err = service.activate("alice", Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, Error::TokenIntegrityMismatch { .. }));
        assert!(service.registry().is_empty());
        assert!(!plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
        assert_eq!(service.registry().provisioning_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_denied_activation_leaves_nothing_behind() {
        let (plane, service) = setup();
        plane.deny("create", KIND_SERVICE_ACCOUNT);

        let err = service.activate("alice", Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(plane.apply_calls(), 0);
        assert_eq!(service.registry().provisioning_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_failed_activation_finishes_skipped_revocation() {
        let (plane, service) = setup();
        let (first, _) = service.activate("alice", Duration::hours(1)).await.unwrap();

        plane.deny("create", KIND_SERVICE_ACCOUNT);
        plane.set_latency(StdDuration::from_millis(50));
        let failing = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.activate("alice", Duration::hours(1)).await })
        };
        while service.registry().provisioning_count("alice") == 0 && !failing.is_finished() {
            tokio::time::sleep(StdDuration::from_millis(1)).await;
        }

        // Kept while the second activation is in flight
        service.deactivate(&first).await.unwrap();
        let err = failing.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));

        assert!(service.registry().is_empty());
        assert_eq!(service.registry().provisioning_count("alice"), 0);
        assert!(!plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
        assert!(!plane.contains(KIND_CLUSTER_ROLE_BINDING, None, "alice-user-admin"));
    }

    #[tokio::test]
    async fn test_timed_out_activation_removes_grant() {
        let (plane, service) = setup();
        plane.set_visibility_lag(20);

        let err = service.activate("alice", Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, Error::TimeoutWaitingForConsistency(_)));
        assert_eq!(plane.apply_calls(), 1);
        assert!(!plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_grant_of_other_session() {
        let (plane, service) = setup();
        let (first, _) = service.activate("alice", Duration::hours(1)).await.unwrap();

        plane.deny("create", KIND_SERVICE_ACCOUNT);
        service.activate("alice", Duration::hours(1)).await.unwrap_err();

        assert!(plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
        assert_eq!(service.registry().snapshot(), vec![first]);
    }

    #[tokio::test]
    async fn test_activation_during_provisioning_keeps_grant() {
        let (plane, service) = setup();
        plane.set_latency(StdDuration::from_millis(20));

        let (first, _) = service.activate("alice", Duration::hours(1)).await.unwrap();

        let racing = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.activate("alice", Duration::hours(1)).await })
        };
        // Let the second activation take its ticket
        while service.registry().provisioning_count("alice") == 0 && !racing.is_finished() {
            tokio::time::sleep(StdDuration::from_millis(1)).await;
        }

        let outcome = service.deactivate(&first).await.unwrap();
        let (second, _) = racing.await.unwrap().unwrap();

        // Either the revoke saw the in-flight activation, or the activation
        // waited for the revoke and recreated the grant.
        assert!(plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
        if outcome == RevokeOutcome::Shared {
            assert_eq!(plane.apply_calls(), 1);
        }
        assert_eq!(service.registry().snapshot(), vec![second]);
    }

    #[tokio::test]
    async fn test_scheduler_reclaims_expired_activation() {
        let (plane, service) = setup();
        let (session, _) = service.activate("alice", Duration::hours(1)).await.unwrap();

        let report = service
            .scheduler()
            .tick_at(session.expires_at + Duration::seconds(1))
            .await;
        assert_eq!(report.removed, vec![session.session_id]);
        assert_eq!(report.revoked, 1);
        assert!(!plane.contains(KIND_SERVICE_ACCOUNT, Some("kube-system"), "alice-user"));
    }
}

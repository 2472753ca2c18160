//! In-memory registry of active sessions.
//!
//! One mutex guards every piece of state. It is only ever held for map
//! operations, never across an `.await` or a control plane call.

use super::AccessSession;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    /// session_id -> session
    sessions: HashMap<String, AccessSession>,
    /// principal -> activations currently between probe and register
    provisioning: HashMap<String, usize>,
    /// principals whose resources are being deleted right now
    revoking: HashSet<String>,
}

impl RegistryState {
    /// Whether anything other than `exclude` keeps the principal's grant alive.
    fn principal_in_use(&self, principal: &str, exclude: &str, now: DateTime<Utc>) -> bool {
        let provisioning = self.provisioning.get(principal).copied().unwrap_or(0) > 0;
        provisioning
            || self
                .sessions
                .values()
                .any(|s| s.session_id != exclude && s.principal == principal && now < s.expires_at)
    }
}

/// Process-lifetime store of active sessions, shared through `Arc`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    revocations: Notify,
}

/// Outcome of asking the registry whether a session's grant may be deleted.
#[derive(Debug)]
pub enum RevocationDecision {
    /// This caller owns the deletion; the principal stays marked until the
    /// claim is dropped.
    Claimed(RevocationClaim),
    /// Another session or activation still uses the grant.
    Shared,
    /// Another caller is already deleting the grant.
    InProgress,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a session.
    pub fn register(&self, session: AccessSession) -> Result<()> {
        self.register_at(session, Utc::now())
    }

    pub fn register_at(&self, session: AccessSession, now: DateTime<Utc>) -> Result<()> {
        if session.expires_at <= now {
            return Err(Error::SessionExpired(session.expires_at));
        }

        debug!(
            session_id = %session.session_id,
            principal = %session.principal,
            expires_at = %session.expires_at,
            "Registering session"
        );
        self.lock()
            .sessions
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    /// Remove a session, returning it if it was present.
    pub fn remove(&self, session_id: &str) -> Option<AccessSession> {
        self.lock().sessions.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<AccessSession> {
        self.lock().sessions.get(session_id).cloned()
    }

    /// Sessions whose service account is `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<AccessSession> {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> Vec<AccessSession> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// True iff some registered session of `principal` is still unexpired.
    pub fn has_active_for_principal(&self, principal: &str, now: DateTime<Utc>) -> bool {
        self.lock()
            .sessions
            .values()
            .any(|s| s.principal == principal && now < s.expires_at)
    }

    /// Record an in-flight activation for `principal`.
    ///
    /// Waits while the principal's grant is being deleted, so a new
    /// activation never races the deletion of the resources it depends on.
    pub async fn begin_provisioning(self: &Arc<Self>, principal: &str) -> ProvisioningTicket {
        loop {
            let notified = self.revocations.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.revoking.contains(principal) {
                    *state.provisioning.entry(principal.to_string()).or_default() += 1;
                    return ProvisioningTicket {
                        registry: Arc::clone(self),
                        principal: principal.to_string(),
                    };
                }
            }

            debug!(principal = %principal, "Waiting for revocation to finish");
            notified.await;
        }
    }

    /// Drop `session` from the registry and decide, in the same critical
    /// section, whether its grant can be deleted.
    pub fn claim_revocation(
        self: &Arc<Self>,
        session: &AccessSession,
        now: DateTime<Utc>,
    ) -> RevocationDecision {
        let mut state = self.lock();
        state.sessions.remove(&session.session_id);

        if state.principal_in_use(&session.principal, &session.session_id, now) {
            return RevocationDecision::Shared;
        }
        if !state.revoking.insert(session.principal.clone()) {
            return RevocationDecision::InProgress;
        }

        RevocationDecision::Claimed(RevocationClaim {
            registry: Arc::clone(self),
            principal: session.principal.clone(),
        })
    }

    pub fn is_revoking(&self, principal: &str) -> bool {
        self.lock().revoking.contains(principal)
    }

    pub fn provisioning_count(&self, principal: &str) -> usize {
        self.lock().provisioning.get(principal).copied().unwrap_or(0)
    }
}

/// Marks an activation in flight; released on drop.
#[derive(Debug)]
pub struct ProvisioningTicket {
    registry: Arc<SessionRegistry>,
    principal: String,
}

impl ProvisioningTicket {
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl Drop for ProvisioningTicket {
    fn drop(&mut self) {
        let mut state = self.registry.lock();
        if let Some(count) = state.provisioning.get_mut(&self.principal) {
            *count -= 1;
            if *count == 0 {
                state.provisioning.remove(&self.principal);
            }
        }
    }
}

/// Exclusive right to delete a principal's grant; released on drop.
#[derive(Debug)]
pub struct RevocationClaim {
    registry: Arc<SessionRegistry>,
    principal: String,
}

impl RevocationClaim {
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl Drop for RevocationClaim {
    fn drop(&mut self) {
        self.registry.lock().revoking.remove(&self.principal);
        self.registry.revocations.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_session;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let session = test_session("alice", Duration::hours(1));
        let id = session.session_id.clone();

        registry.register(session.clone()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id), Some(session));

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_overwrites_same_id() {
        let registry = SessionRegistry::new();
        let mut session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();

        session.expires_at += Duration::minutes(30);
        registry.register(session.clone()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&session.session_id).unwrap().expires_at,
            session.expires_at
        );
    }

    #[test]
    fn test_register_rejects_expired_session() {
        let registry = SessionRegistry::new();
        let session = test_session("alice", Duration::seconds(-1));
        assert!(matches!(
            registry.register(session),
            Err(Error::SessionExpired(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_has_active_for_principal() {
        let registry = SessionRegistry::new();
        let session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();

        let now = Utc::now();
        assert!(registry.has_active_for_principal("alice", now));
        assert!(!registry.has_active_for_principal("bob", now));
        assert!(!registry.has_active_for_principal("alice", session.expires_at));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SessionRegistry::new();
        registry
            .register(test_session("alice", Duration::hours(1)))
            .unwrap();
        let snapshot = registry.snapshot();
        registry
            .register(test_session("bob", Duration::hours(1)))
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_find_by_name() {
        let registry = SessionRegistry::new();
        registry
            .register(test_session("alice", Duration::hours(1)))
            .unwrap();
        registry
            .register(test_session("alice", Duration::hours(2)))
            .unwrap();
        registry
            .register(test_session("bob", Duration::hours(1)))
            .unwrap();
        assert_eq!(registry.find_by_name("alice-user").len(), 2);
        assert_eq!(registry.find_by_name("carol-user").len(), 0);
    }

    #[test]
    fn test_claim_revocation_is_shared_while_other_session_active() {
        let registry = Arc::new(SessionRegistry::new());
        let first = test_session("alice", Duration::hours(1));
        let second = test_session("alice", Duration::hours(2));
        registry.register(first.clone()).unwrap();
        registry.register(second.clone()).unwrap();

        let now = Utc::now();
        assert!(matches!(
            registry.claim_revocation(&first, now),
            RevocationDecision::Shared
        ));
        // The revoked session itself is gone either way
        assert!(registry.get(&first.session_id).is_none());

        match registry.claim_revocation(&second, now) {
            RevocationDecision::Claimed(claim) => {
                assert_eq!(claim.principal(), "alice");
                assert!(registry.is_revoking("alice"));
            }
            other => panic!("expected claim, got {:?}", other),
        }
        assert!(!registry.is_revoking("alice"));
    }

    #[test]
    fn test_expired_siblings_do_not_block_revocation() {
        let registry = Arc::new(SessionRegistry::new());
        let stale = test_session("alice", Duration::seconds(1));
        let current = test_session("alice", Duration::hours(1));
        registry.register(stale.clone()).unwrap();
        registry.register(current.clone()).unwrap();

        let later = stale.expires_at + Duration::seconds(1);
        assert!(matches!(
            registry.claim_revocation(&current, later),
            RevocationDecision::Claimed(_)
        ));
    }

    #[test]
    fn test_concurrent_claims_only_one_wins() {
        let registry = Arc::new(SessionRegistry::new());
        let session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();

        let now = Utc::now();
        let first = registry.claim_revocation(&session, now);
        assert!(matches!(first, RevocationDecision::Claimed(_)));
        assert!(matches!(
            registry.claim_revocation(&session, now),
            RevocationDecision::InProgress
        ));
    }

    #[tokio::test]
    async fn test_provisioning_blocks_revocation() {
        let registry = Arc::new(SessionRegistry::new());
        let session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();

        let ticket = registry.begin_provisioning("alice").await;
        assert_eq!(registry.provisioning_count("alice"), 1);
        assert!(matches!(
            registry.claim_revocation(&session, Utc::now()),
            RevocationDecision::Shared
        ));

        drop(ticket);
        assert_eq!(registry.provisioning_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_provisioning_waits_for_revocation() {
        let registry = Arc::new(SessionRegistry::new());
        let session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();

        let claim = match registry.claim_revocation(&session, Utc::now()) {
            RevocationDecision::Claimed(claim) => claim,
            other => panic!("expected claim, got {:?}", other),
        };

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.begin_provisioning("alice").await })
        };

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(registry.provisioning_count("alice"), 0);

        drop(claim);
        let ticket = tokio::time::timeout(StdDuration::from_secs(1), waiter)
            .await
            .expect("provisioning should resume after revocation")
            .unwrap();
        assert_eq!(ticket.principal(), "alice");
        assert_eq!(registry.provisioning_count("alice"), 1);
    }

    #[tokio::test]
    async fn test_other_principals_are_not_blocked() {
        let registry = Arc::new(SessionRegistry::new());
        let session = test_session("alice", Duration::hours(1));
        registry.register(session.clone()).unwrap();
        let _claim = registry.claim_revocation(&session, Utc::now());

        let ticket = tokio::time::timeout(
            StdDuration::from_millis(100),
            registry.begin_provisioning("bob"),
        )
        .await
        .expect("bob is not being revoked");
        assert_eq!(ticket.principal(), "bob");
    }
}

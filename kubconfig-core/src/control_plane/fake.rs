//! In-memory control plane for tests and dry runs.
//!
//! Models the parts of the API server the session manager depends on:
//! eventually-consistent reads after `apply`, RBAC answers for `can-i`,
//! bounded tokens with an embedded `exp`, and failing deletes.

use super::{ClusterIdentity, ControlPlaneClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type ObjectKey = (String, String, String);

fn key(kind: &str, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        kind.to_lowercase(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// A token request as received by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub identity: String,
    pub namespace: String,
    pub ttl_seconds: i64,
}

#[derive(Debug)]
struct FakeState {
    /// object -> reads left before it becomes visible
    objects: HashMap<ObjectKey, u32>,
    denied: HashSet<(String, String)>,
    failing_deletes: HashSet<String>,
    visibility_lag: u32,
    token_skew_secs: i64,
    latency: Duration,
    cluster: ClusterIdentity,
    apply_calls: usize,
    deleted: Vec<(String, String)>,
    token_requests: Vec<TokenRequest>,
}

/// Fake [`ControlPlaneClient`] holding cluster state in memory.
#[derive(Debug)]
pub struct InMemoryControlPlane {
    state: Mutex<FakeState>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                objects: HashMap::new(),
                denied: HashSet::new(),
                failing_deletes: HashSet::new(),
                visibility_lag: 0,
                token_skew_secs: 0,
                latency: Duration::ZERO,
                cluster: ClusterIdentity {
                    cluster_name: "fake-cluster".to_string(),
                    server_url: "https://127.0.0.1:6443".to_string(),
                    ca_data: "ZmFrZS1jYQ==".to_string(),
                },
                apply_calls: 0,
                deleted: Vec::new(),
                token_requests: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Newly applied objects stay invisible for `reads` lookups.
    pub fn set_visibility_lag(&self, reads: u32) {
        self.lock().visibility_lag = reads;
    }

    /// Answer "no" to `can-i <verb> <kind>`.
    pub fn deny(&self, verb: &str, kind: &str) {
        self.lock()
            .denied
            .insert((verb.to_string(), kind.to_lowercase()));
    }

    /// Make every delete of `kind` fail.
    pub fn fail_deletes_of(&self, kind: &str) {
        self.lock().failing_deletes.insert(kind.to_lowercase());
    }

    /// Shift the `exp` of issued tokens by `secs`.
    pub fn set_token_skew(&self, secs: i64) {
        self.lock().token_skew_secs = secs;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn set_cluster(&self, cluster: ClusterIdentity) {
        self.lock().cluster = cluster;
    }

    /// Seed an already visible object.
    pub fn insert(&self, kind: &str, namespace: Option<&str>, name: &str) {
        self.lock().objects.insert(key(kind, namespace, name), 0);
    }

    /// Whether an object exists, visible or not.
    pub fn contains(&self, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&key(kind, namespace, name))
    }

    pub fn apply_calls(&self) -> usize {
        self.lock().apply_calls
    }

    /// `(kind, name)` of every successful delete of an existing object, in order.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.lock().deleted.clone()
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.lock().token_requests.clone()
    }

    /// Build a token shaped like a service account JWT.
    pub fn mint_token(subject: &str, exp: i64) -> String {
        let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        let claims = serde_json::json!({
            "iss": "https://kubernetes.default.svc",
            "sub": subject,
            "iat": Utc::now().timestamp(),
            "exp": exp,
        });
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string()),
            URL_SAFE_NO_PAD.encode("fake-signature")
        )
    }
}

#[derive(Debug, Deserialize)]
struct ManifestHead {
    kind: String,
    metadata: ManifestMetadata,
}

#[derive(Debug, Deserialize)]
struct ManifestMetadata {
    name: String,
    namespace: Option<String>,
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
    async fn probe_capability(&self, verb: &str, resource_kind: &str) -> Result<bool> {
        self.delay().await;
        Ok(!self
            .lock()
            .denied
            .contains(&(verb.to_string(), resource_kind.to_lowercase())))
    }

    async fn apply(&self, manifest: &str) -> Result<()> {
        self.delay().await;

        let mut heads = Vec::new();
        for document in serde_yaml::Deserializer::from_str(manifest) {
            heads.push(ManifestHead::deserialize(document)?);
        }

        let mut state = self.lock();
        state.apply_calls += 1;
        let lag = state.visibility_lag;
        for head in heads {
            let object = key(&head.kind, head.metadata.namespace.as_deref(), &head.metadata.name);
            // Re-applying an existing object leaves its visibility alone
            state.objects.entry(object).or_insert(lag);
        }
        Ok(())
    }

    async fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        self.delay().await;
        let mut state = self.lock();
        match state.objects.get_mut(&key(kind, namespace, name)) {
            Some(0) => Ok(true),
            Some(remaining) => {
                *remaining -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        ignore_missing: bool,
    ) -> Result<()> {
        self.delay().await;
        let mut state = self.lock();
        if state.failing_deletes.contains(&kind.to_lowercase()) {
            return Err(Error::command_failed(
                format!("delete {} {}", kind, name),
                "injected failure",
            ));
        }

        if state.objects.remove(&key(kind, namespace, name)).is_some() {
            state.deleted.push((kind.to_lowercase(), name.to_string()));
            Ok(())
        } else if ignore_missing {
            Ok(())
        } else {
            Err(Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
        }
    }

    async fn issue_bounded_token(
        &self,
        identity: &str,
        namespace: &str,
        ttl_seconds: i64,
    ) -> Result<String> {
        self.delay().await;
        let mut state = self.lock();
        state.token_requests.push(TokenRequest {
            identity: identity.to_string(),
            namespace: namespace.to_string(),
            ttl_seconds,
        });

        if !state
            .objects
            .contains_key(&key(super::KIND_SERVICE_ACCOUNT, Some(namespace), identity))
        {
            return Err(Error::command_failed(
                format!("create token {}", identity),
                format!("serviceaccounts \"{}\" not found", identity),
            ));
        }

        let exp = Utc::now().timestamp() + ttl_seconds + state.token_skew_secs;
        let subject = format!("system:serviceaccount:{}:{}", namespace, identity);
        Ok(Self::mint_token(&subject, exp))
    }

    async fn read_active_cluster_identity(&self) -> Result<ClusterIdentity> {
        self.delay().await;
        Ok(self.lock().cluster.clone())
    }
}

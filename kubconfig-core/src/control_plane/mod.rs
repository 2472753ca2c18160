//! Access to the cluster control plane.
//!
//! [`ControlPlaneClient`] is the only way the session manager talks to a
//! cluster. [`KubectlClient`] drives the `kubectl` binary;
//! [`InMemoryControlPlane`] is a fake with controllable consistency lag.

mod fake;
mod kubectl;
pub mod manifest;

pub use fake::*;
pub use kubectl::*;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const KIND_SERVICE_ACCOUNT: &str = "serviceaccount";
pub const KIND_CLUSTER_ROLE_BINDING: &str = "clusterrolebinding";

/// Cluster the active control-plane configuration points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub cluster_name: String,
    pub server_url: String,
    /// Base64 CA bundle, empty when the cluster has none configured
    pub ca_data: String,
}

/// Operations the session manager needs from the cluster.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Ask whether the current caller may `verb` the given resource kind.
    async fn probe_capability(&self, verb: &str, resource_kind: &str) -> Result<bool>;

    /// Apply a (possibly multi-document) YAML manifest.
    async fn apply(&self, manifest: &str) -> Result<()>;

    /// Whether the named resource is currently visible.
    async fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool>;

    /// Delete a resource. With `ignore_missing`, absence is not an error.
    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        ignore_missing: bool,
    ) -> Result<()>;

    /// Mint a bearer token for a service account.
    async fn issue_bounded_token(
        &self,
        identity: &str,
        namespace: &str,
        ttl_seconds: i64,
    ) -> Result<String>;

    /// Cluster name, server URL and CA data of the active context.
    async fn read_active_cluster_identity(&self) -> Result<ClusterIdentity>;
}

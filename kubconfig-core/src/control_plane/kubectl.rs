//! `kubectl`-backed control plane client.
//!
//! Every operation spawns `kubectl`; when a kubeconfig path is set it is
//! passed with `--kubeconfig` so the caller's environment is left alone.

use super::{ClusterIdentity, ControlPlaneClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Control plane client that shells out to `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
        }
    }

    /// Pin every call to a specific kubeconfig file.
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref path) = self.kubeconfig {
            cmd.arg("--kubeconfig").arg(path);
        }
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("kubectl {}", args.join(" "));
        Ok(self.command(args.iter().copied()).output().await?)
    }

    /// Run and require success, returning trimmed stdout.
    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(Error::command_failed(
                format!("kubectl {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Check the cluster answers at all.
    pub async fn cluster_info(&self) -> Result<()> {
        self.run_checked(&["cluster-info"]).await.map(|_| ())
    }

    /// Probe with extra arguments, e.g. a namespace.
    pub async fn can_i(&self, verb: &str, resource_kind: &str, extra: &[&str]) -> Result<bool> {
        let mut args = vec!["auth", "can-i", verb, resource_kind];
        args.extend_from_slice(extra);
        let output = self.run(&args).await?;

        // `can-i` exits 1 and prints "no" when denied
        let answer = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
        match answer.as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            _ if output.status.success() => Ok(true),
            _ => Err(Error::command_failed(
                format!("kubectl {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr).trim(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MinifiedConfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    server: String,
    #[serde(rename = "certificate-authority-data", default)]
    certificate_authority_data: String,
}

#[async_trait]
impl ControlPlaneClient for KubectlClient {
    async fn probe_capability(&self, verb: &str, resource_kind: &str) -> Result<bool> {
        self.can_i(verb, resource_kind, &[]).await
    }

    async fn apply(&self, manifest: &str) -> Result<()> {
        let mut child = self
            .command(["apply", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(manifest.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::command_failed(
                "kubectl apply -f -",
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        debug!("Applied manifest: {}", String::from_utf8_lossy(&output.stdout).trim());
        Ok(())
    }

    async fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<bool> {
        let mut args = vec!["get", kind, name];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["--ignore-not-found", "-o", "jsonpath={.metadata.name}"]);

        let stdout = self.run_checked(&args).await?;
        Ok(!stdout.is_empty())
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        ignore_missing: bool,
    ) -> Result<()> {
        let mut args = vec!["delete", kind, name];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        if ignore_missing {
            args.push("--ignore-not-found=true");
        }

        self.run_checked(&args).await?;
        debug!("Deleted {} {}", kind, name);
        Ok(())
    }

    async fn issue_bounded_token(
        &self,
        identity: &str,
        namespace: &str,
        ttl_seconds: i64,
    ) -> Result<String> {
        let duration = format!("{}s", ttl_seconds);
        let token = self
            .run_checked(&[
                "create",
                "token",
                identity,
                "--namespace",
                namespace,
                "--duration",
                duration.as_str(),
            ])
            .await?;

        if token.is_empty() {
            return Err(Error::MalformedToken("kubectl returned an empty token".into()));
        }
        Ok(token)
    }

    async fn read_active_cluster_identity(&self) -> Result<ClusterIdentity> {
        let raw = self
            .run_checked(&["config", "view", "--minify", "--raw", "-o", "json"])
            .await?;
        let config: MinifiedConfig = serde_json::from_str(&raw)?;

        let named = config
            .clusters
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("clusters[0]", "no active cluster"))?;

        if named.name.is_empty() || named.cluster.server.is_empty() {
            return Err(Error::malformed(
                "clusters[0]",
                format!("invalid cluster info: name={:?}, url={:?}", named.name, named.cluster.server),
            ));
        }

        Ok(ClusterIdentity {
            cluster_name: named.name,
            server_url: named.cluster.server,
            ca_data: named.cluster.certificate_authority_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubeconfig_flag_precedes_arguments() {
        let client = KubectlClient::new("kubectl").with_kubeconfig("/tmp/staged.cfg");
        let cmd = client.command(["get", "pods"]);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, ["--kubeconfig", "/tmp/staged.cfg", "get", "pods"]);
    }

    #[test]
    fn test_minified_config_parsing() {
        let raw = r#"{
            "clusters": [{
                "name": "prod",
                "cluster": {
                    "server": "https://prod.example:6443",
                    "certificate-authority-data": "Q0EK"
                }
            }]
        }"#;
        let config: MinifiedConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.clusters[0].name, "prod");
        assert_eq!(config.clusters[0].cluster.certificate_authority_data, "Q0EK");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let client = KubectlClient::new("/nonexistent/kubectl-binary");
        let err = client.get("serviceaccount", "alice-user", None).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}

//! Configuration management for kubconfig.
//!
//! Configuration is loaded from:
//! 1. `$KUBCONFIG_CONFIG` if set
//! 2. `~/.kube/kubconfig.toml`
//! 3. Default values

use anyhow::{Context, Result};
use kubconfig_core::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where kubeconfig documents are fetched from
    #[serde(default)]
    pub source: SourceConfig,

    /// Local paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// kubectl settings
    #[serde(default)]
    pub kubectl: KubectlConfig,

    /// Session manager tunables
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding `*.cfg` documents
    #[serde(default = "default_source_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory (`~/.kube`)
    #[serde(default = "default_kube_dir")]
    pub kube_dir: PathBuf,

    /// Fetched and staged documents
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Per-process session records
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,

    /// The kubeconfig kubectl reads by default
    #[serde(default = "default_kubeconfig_file")]
    pub kubeconfig_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubectlConfig {
    /// kubectl binary, resolved through PATH
    #[serde(default = "default_kubectl")]
    pub binary: String,
}

// Default value functions
fn default_kube_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kube")
}

fn default_source_dir() -> PathBuf {
    default_kube_dir().join("kubconfigs")
}

fn default_cache_dir() -> PathBuf {
    default_kube_dir().join("cache")
}

fn default_session_dir() -> PathBuf {
    default_kube_dir().join("sessions")
}

fn default_kubeconfig_file() -> PathBuf {
    default_kube_dir().join("config")
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: default_source_dir(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            kube_dir: default_kube_dir(),
            cache_dir: default_cache_dir(),
            session_dir: default_session_dir(),
            kubeconfig_file: default_kubeconfig_file(),
        }
    }
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: default_kubectl(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("KUBCONFIG_CONFIG") {
            PathBuf::from(path)
        } else {
            default_kube_dir().join("kubconfig.toml")
        }
    }

    /// Resolve the kubectl binary through PATH.
    pub fn kubectl_path(&self) -> Result<PathBuf> {
        which::which(&self.kubectl.binary)
            .with_context(|| format!("{} not found in PATH", self.kubectl.binary))
    }

    /// Per-process session record for `identity`.
    pub fn session_file(&self, identity: &str) -> PathBuf {
        self.paths
            .session_dir
            .join(format!("{}-{}.json", identity, std::process::id()))
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.kube_dir).context("Failed to create kube directory")?;
        std::fs::create_dir_all(&self.paths.cache_dir)
            .context("Failed to create cache directory")?;
        std::fs::create_dir_all(&self.paths.session_dir)
            .context("Failed to create session directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.kubectl.binary, "kubectl");
        assert!(config.paths.kubeconfig_file.ends_with(".kube/config"));
        assert!(config.paths.cache_dir.ends_with(".kube/cache"));
        assert_eq!(config.session.namespace, "kube-system");
        assert_eq!(config.session.poll_attempts, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("kubconfig.toml");
        std::fs::write(
            &path,
            "[source]\ndir = \"/srv/kubeconfigs\"\n\n[session]\nnamespace = \"access\"\nsweep_interval_secs = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config.source.dir, PathBuf::from("/srv/kubeconfigs"));
        assert_eq!(config.session.namespace, "access");
        assert_eq!(config.session.sweep_interval_secs, 5);
        assert_eq!(config.session.token_tolerance_secs, 60);
        assert_eq!(config.kubectl.binary, "kubectl");
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("nested").join("kubconfig.toml");

        let mut config = Config::default();
        config.kubectl.binary = "/opt/bin/kubectl".to_string();
        config.session.grant_deadline_secs = 30;
        config.save_to(&path).expect("Failed to save config");

        let loaded = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(loaded.kubectl.binary, "/opt/bin/kubectl");
        assert_eq!(loaded.session.grant_deadline_secs, 30);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = tempdir().expect("Failed to create temp dir");
        let loaded = Config::load_from(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.kubectl.binary, "kubectl");
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let temp = tempdir().expect("Failed to create temp dir");
        let config = Config {
            paths: PathsConfig {
                kube_dir: temp.path().join("kube"),
                cache_dir: temp.path().join("kube/cache"),
                session_dir: temp.path().join("kube/sessions"),
                kubeconfig_file: temp.path().join("kube/config"),
            },
            ..Config::default()
        };

        config.ensure_dirs().expect("Failed to create directories");
        assert!(config.paths.cache_dir.is_dir());
        assert!(config.paths.session_dir.is_dir());

        let session_file = config.session_file("alice-user");
        assert!(session_file.starts_with(&config.paths.session_dir));
        assert!(
            session_file
                .to_string_lossy()
                .ends_with(&format!("alice-user-{}.json", std::process::id()))
        );
    }
}

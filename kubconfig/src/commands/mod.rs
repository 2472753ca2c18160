//! Command implementations for kubconfig CLI.
//!
//! Each submodule implements one command. Helpers shared between commands
//! (principal lookup, private file writes, session records) live here.

pub mod activate;
pub mod cleanup;
pub mod clear;
pub mod current;
pub mod deactivate;
pub mod init;
pub mod list;
pub mod status;
pub mod verify;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use kubconfig_core::AccessSession;
use kubconfig_core::kubeconfig::KubeconfigDocument;
use kubconfig_core::source::restrict_permissions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

/// What `activate` leaves behind so `deactivate` can find the admin
/// kubeconfig the session was created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Name of the source document (`prod.cfg`)
    pub source: String,
    pub session: AccessSession,
}

impl SessionRecord {
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_private(path, content.as_bytes()).await
    }

    /// Every record in `dir` for the given service account.
    pub fn find(dir: &Path, identity: &str) -> Vec<(PathBuf, SessionRecord)> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let content = std::fs::read_to_string(&path).ok()?;
                let record: SessionRecord = serde_json::from_str(&content).ok()?;
                (record.session.name == identity).then_some((path, record))
            })
            .collect()
    }
}

/// Who we are acting for: `$USER`, `$USERNAME`, then `whoami`.
pub fn resolve_principal() -> Result<String> {
    for var in ["USER", "USERNAME"] {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Ok(value.trim().to_string());
            }
        }
    }

    let output = std::process::Command::new("whoami")
        .output()
        .context("Failed to run whoami")?;
    if !output.status.success() {
        bail!("Could not determine current user");
    }
    let user = String::from_utf8_lossy(&output.stdout).trim().to_string();
    // Windows prints DOMAIN\user
    let user = user.rsplit('\\').next().unwrap_or_default().to_string();
    if user.is_empty() {
        bail!("Could not determine current user");
    }
    Ok(user)
}

/// Write a file only its owner can read.
pub async fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    restrict_permissions(path).await?;
    Ok(())
}

/// Read the active kubeconfig, `None` when there is none or it was cleared.
pub fn read_active_kubeconfig(config: &Config) -> Result<Option<KubeconfigDocument>> {
    let path = &config.paths.kubeconfig_file;
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }

    let doc = KubeconfigDocument::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(doc))
}

/// Truncate the active kubeconfig.
pub async fn clear_active_kubeconfig(config: &Config) -> Result<()> {
    write_private(&config.paths.kubeconfig_file, b"").await
}

/// Human readable remaining time, e.g. `1h 5m 3s`.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Removes a staged file when dropped.
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub async fn create(path: PathBuf, data: &[u8]) -> Result<Self> {
        write_private(&path, data).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

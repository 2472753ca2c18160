//! Deactivate command.
//!
//! Revocation is best effort: the kubeconfig is cleared even when the
//! service account could not be deleted.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use kubconfig_core::control_plane::KubectlClient;
use kubconfig_core::session::{self, AccessSession};
use kubconfig_core::AccessService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{SessionRecord, StagedFile, clear_active_kubeconfig, read_active_kubeconfig, spinner};
use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    let Some(doc) = read_active_kubeconfig(config)? else {
        println!("No active session");
        return Ok(());
    };

    let (identity, cluster) = match doc.identity_from_context() {
        Ok((identity, cluster)) => (identity.to_string(), cluster.to_string()),
        Err(e) => {
            println!(
                "{}",
                format!("⚠ Could not get service account info: {}", e).yellow()
            );
            clear_active_kubeconfig(config).await?;
            println!("{} Kubeconfig cleared", "✓".green());
            return Ok(());
        }
    };

    let records = SessionRecord::find(&config.paths.session_dir, &identity);

    // Prefer the admin kubeconfig the session was created with
    let cached_source = records
        .iter()
        .map(|(_, record)| config.paths.cache_dir.join(&record.source))
        .find(|path| path.is_file());

    let mut staged = None;
    let admin_kubeconfig: PathBuf = match cached_source {
        Some(path) => path,
        None => {
            debug!("No cached source kubeconfig, revoking with the session token");
            let raw = doc.to_yaml()?;
            let file = StagedFile::create(
                config.paths.cache_dir.join(format!("{}.deactivate.tmp", identity)),
                raw.as_bytes(),
            )
            .await?;
            staged.insert(file).path().to_path_buf()
        }
    };

    let session = match records.first() {
        Some((_, record)) => record.session.clone(),
        None => {
            let now = Utc::now();
            AccessSession {
                session_id: session::new_session_id(&identity),
                principal: session::principal_from_identity(&identity).to_string(),
                name: identity.clone(),
                namespace: config.session.namespace.clone(),
                cluster_name: cluster,
                server_url: doc.server().unwrap_or_default().to_string(),
                created_at: now,
                expires_at: now,
            }
        }
    };

    let outcome = match config.kubectl_path() {
        Ok(binary) => {
            let kubectl = KubectlClient::new(binary).with_kubeconfig(&admin_kubeconfig);
            let service = AccessService::new(Arc::new(kubectl), config.session.clone());

            let pb = spinner(format!("Revoking {}...", identity));
            let result = service.deactivate(&session).await;
            pb.finish_and_clear();
            result.map_err(anyhow::Error::from)
        }
        Err(e) => Err(e),
    };

    clear_active_kubeconfig(config).await?;

    match outcome {
        Ok(_) => println!("{} Cleaned up service account: {}", "✓".green(), identity),
        Err(e) => {
            warn!(error = %e, "Revocation incomplete");
            println!("{}", format!("⚠ Error cleaning up resources: {:#}", e).yellow());
        }
    }

    for (path, _) in &records {
        if let Err(e) = std::fs::remove_file(path) {
            println!("{}", format!("⚠ Error removing {}: {}", path.display(), e).yellow());
        }
    }

    drop(staged);
    println!("{} Successfully deactivated session", "✓".green());
    Ok(())
}

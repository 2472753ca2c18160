//! Activate command.
//!
//! Fetches a kubeconfig, creates a temporary service account with it,
//! swaps the document's token for one bound to the session and installs
//! the result as the active kubeconfig.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use colored::Colorize;
use kubconfig_core::control_plane::KubectlClient;
use kubconfig_core::kubeconfig::KubeconfigDocument;
use kubconfig_core::source::{self, BlobStore, DirectoryStore};
use kubconfig_core::token::Token;
use kubconfig_core::{AccessService, AccessSession};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{SessionRecord, StagedFile, format_remaining, resolve_principal, spinner, write_private};
use crate::cli::ActivateArgs;
use crate::config::Config;

pub async fn execute(args: ActivateArgs, config: &Config) -> Result<()> {
    source::validate_name(&args.name)?;

    let max_ttl = config.session.max_ttl();
    let min_ttl = config.session.min_ttl();
    let mut ttl = args.session.unwrap_or_else(|| config.session.default_ttl());
    if ttl > max_ttl {
        bail!(
            "Maximum session duration is {}",
            format_remaining(max_ttl)
        );
    }
    if ttl < min_ttl {
        println!(
            "{}",
            format!(
                "⚠ Minimum session duration is {}, adjusting...",
                format_remaining(min_ttl)
            )
            .yellow()
        );
        ttl = min_ttl;
    }

    config.ensure_dirs()?;
    let principal = resolve_principal()?;

    // Fetch the admin kubeconfig and stage it for kubectl
    let store = DirectoryStore::new(&config.source.dir, &config.paths.cache_dir);
    let original = store
        .fetch(&args.name)
        .await
        .with_context(|| format!("Failed to fetch {}", args.name))?;
    let doc = KubeconfigDocument::from_bytes(&original)
        .with_context(|| format!("Invalid kubeconfig {}", args.name))?;
    let ca_data = doc.certificate_authority_data().unwrap_or_default().to_string();

    let staged = StagedFile::create(
        config.paths.cache_dir.join(format!("{}.tmp", args.name)),
        &original,
    )
    .await?;

    let kubectl = KubectlClient::new(config.kubectl_path()?).with_kubeconfig(staged.path());
    let service = AccessService::new(Arc::new(kubectl), config.session.clone());

    let pb = spinner(format!("Creating temporary access for {}...", principal));
    let result = service.activate(&principal, ttl).await;
    pb.finish_and_clear();
    let (session, token) = result.context("Error creating temporary access")?;

    let record_path = install_or_revoke(&service, config, &args.name, doc, &session, &token).await?;

    if let Some(ref export) = args.export {
        let standalone = KubeconfigDocument::generate(&session, token.as_str(), &ca_data)?;
        write_private(export, standalone.to_yaml()?.as_bytes()).await?;
        println!("  Exported session kubeconfig to {}", export.display());
    }

    println!(
        "{} Activated '{}' as {} (session expires at {})",
        "✓".green(),
        args.name.cyan(),
        session.name,
        session.expires_at.to_rfc3339()
    );

    if args.hold {
        hold(&service, &session, config).await?;
        if let Err(e) = std::fs::remove_file(&record_path) {
            println!(
                "{}",
                format!("⚠ Error removing {}: {}", record_path.display(), e).yellow()
            );
        }
    }

    drop(staged);
    Ok(())
}

/// Install the session kubeconfig and its record, revoking the session if
/// either cannot be written so no grant is left without a record.
async fn install_or_revoke(
    service: &AccessService,
    config: &Config,
    source: &str,
    doc: KubeconfigDocument,
    session: &AccessSession,
    token: &Token,
) -> Result<PathBuf> {
    match install(config, source, doc, session, token).await {
        Ok(record_path) => Ok(record_path),
        Err(e) => {
            if let Err(cleanup) = service.deactivate(session).await {
                warn!(error = %cleanup, "Rollback incomplete");
                println!("{}", format!("⚠ Error cleaning up resources: {}", cleanup).yellow());
            }
            Err(e)
        }
    }
}

async fn install(
    config: &Config,
    source: &str,
    mut doc: KubeconfigDocument,
    session: &AccessSession,
    token: &Token,
) -> Result<PathBuf> {
    doc.set_token(token.as_str())?;
    doc.set_identity(session)?;
    write_private(&config.paths.kubeconfig_file, doc.to_yaml()?.as_bytes()).await?;

    let record_path = config.session_file(&session.name);
    SessionRecord {
        source: source.to_string(),
        session: session.clone(),
    }
    .save(&record_path)
    .await?;
    Ok(record_path)
}

/// Keep the process alive until the session expires or Ctrl+C, then revoke.
async fn hold(service: &AccessService, session: &AccessSession, config: &Config) -> Result<()> {
    let remaining = session.remaining_at(Utc::now());
    println!(
        "  Holding session for {} (Ctrl+C to end early)",
        format_remaining(remaining)
    );

    let cleanup = service.scheduler().start();
    let until_expiry = remaining.to_std().unwrap_or_default() + config.session.sweep_interval();

    tokio::select! {
        _ = tokio::time::sleep(until_expiry) => {
            info!(session_id = %session.session_id, "Session expired");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            println!();
            info!(session_id = %session.session_id, "Interrupted, ending session");
        }
    }

    cleanup.shutdown().await;

    // The sweep may already have revoked it
    if service.registry().get(&session.session_id).is_some() {
        let pb = spinner("Revoking temporary access...");
        let result = service.deactivate(session).await;
        pb.finish_and_clear();
        if let Err(e) = result {
            warn!(error = %e, "Cleanup incomplete");
            println!("{}", format!("⚠ Error cleaning up resources: {}", e).yellow());
        }
    }

    super::clear_active_kubeconfig(config).await?;
    println!("{} Session ended, kubeconfig cleared", "✓".green());
    Ok(())
}

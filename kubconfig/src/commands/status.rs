//! Status command.

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use kubconfig_core::token::expiry;

use super::{format_remaining, read_active_kubeconfig};
use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    let Some(doc) = read_active_kubeconfig(config)? else {
        println!("No kubeconfig is currently active");
        return Ok(());
    };

    let Some(token) = doc.token() else {
        println!("{}", "○ Active kubeconfig has no token".yellow());
        return Ok(());
    };

    let expires_at = expiry::expiry_time(token).context("Error checking token status")?;
    let now = Utc::now();

    if let Ok(context) = doc.context_name() {
        println!("  Context: {}", context.cyan());
    }
    if expires_at <= now {
        println!(
            "{}",
            format!("✗ Token has expired (expired at {})", expires_at.to_rfc3339()).red()
        );
    } else {
        println!(
            "{} Token is valid (expires in {}, at {})",
            "✓".green(),
            format_remaining(expires_at - now),
            expires_at.to_rfc3339()
        );
    }
    Ok(())
}

//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Temporary cluster access sessions
///
/// Activates a kubeconfig with a short-lived service account token and
/// removes the service account when the session ends.
#[derive(Parser, Debug)]
#[command(name = "kubconfig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the configuration file
    Init(InitArgs),

    /// List available kubeconfigs
    List,

    /// Activate a kubeconfig with a temporary token
    Activate(ActivateArgs),

    /// Revoke the active session and clear the kubeconfig
    Deactivate,

    /// Show remaining time of the active session
    Status,

    /// Show the active context
    Current,

    /// Clear the active kubeconfig
    Clear,

    /// Delete cached kubeconfigs
    Cleanup {
        /// Only delete files older than this many days
        #[arg(long, default_value_t = 30)]
        older_than: u64,
    },

    /// Check cluster connectivity and permissions
    Verify,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory holding the kubeconfig documents
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// kubectl binary to use
    #[arg(long)]
    pub kubectl: Option<String>,

    /// Don't prompt, take flags and defaults
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ActivateArgs {
    /// Kubeconfig name (must end with .cfg)
    pub name: String,

    /// Session duration (e.g. 2h, 30m, 1h30m) [default: session.default_ttl_secs, 8h]
    #[arg(short, long, value_parser = parse_duration)]
    pub session: Option<chrono::Duration>,

    /// Stay in the foreground and revoke when the session ends
    #[arg(long)]
    pub hold: bool,

    /// Also write a standalone kubeconfig for the session
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Parse durations like `90s`, `45m`, `8h` or `1h30m`.
pub fn parse_duration(raw: &str) -> Result<chrono::Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let mut total = chrono::Duration::zero();
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let value: i64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {:?}: expected a number before '{}'", raw, c))?;
        digits.clear();

        total += match c {
            'h' => chrono::Duration::hours(value),
            'm' => chrono::Duration::minutes(value),
            's' => chrono::Duration::seconds(value),
            other => return Err(format!("invalid duration {:?}: unknown unit '{}'", raw, other)),
        };
    }

    if !digits.is_empty() {
        return Err(format!("invalid duration {:?}: missing unit (h, m or s)", raw));
    }
    if total <= chrono::Duration::zero() {
        return Err(format!("invalid duration {:?}: must be positive", raw));
    }
    Ok(total)
}

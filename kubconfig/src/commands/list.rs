//! List command.

use anyhow::{Context, Result};
use colored::Colorize;
use kubconfig_core::source::{BlobStore, DirectoryStore};

use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    let store = DirectoryStore::new(&config.source.dir, &config.paths.cache_dir);
    let names = store
        .list()
        .await
        .with_context(|| format!("Error listing {}", config.source.dir.display()))?;

    if names.is_empty() {
        println!("No kubeconfigs found in {}", config.source.dir.display());
        return Ok(());
    }

    println!("{}", "Available kubeconfigs:".cyan());
    for name in names {
        if store.is_cached(&name) {
            println!("  - {} {}", name, "(cached)".dimmed());
        } else {
            println!("  - {}", name);
        }
    }
    Ok(())
}

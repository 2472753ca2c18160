//! Clear command.

use anyhow::Result;
use colored::Colorize;

use super::clear_active_kubeconfig;
use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    clear_active_kubeconfig(config).await?;
    println!("{} Kubeconfig cleared", "✓".green());
    Ok(())
}

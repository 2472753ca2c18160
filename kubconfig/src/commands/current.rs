//! Current command.

use anyhow::Result;

use super::read_active_kubeconfig;
use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    match read_active_kubeconfig(config)? {
        Some(doc) => println!("Current context: {}", doc.context_name()?),
        None => println!("No kubeconfig is currently active"),
    }
    Ok(())
}

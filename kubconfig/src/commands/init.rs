//! Init command.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;
use std::path::PathBuf;

use crate::cli::InitArgs;
use crate::config::Config;

pub async fn execute(args: InitArgs, current: &Config) -> Result<()> {
    let mut config = current.clone();

    if let Some(dir) = args.source_dir {
        config.source.dir = dir;
    } else if !args.yes {
        let dir: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Directory holding kubeconfig (*.cfg) files")
            .default(config.source.dir.display().to_string())
            .interact_text()?;
        config.source.dir = PathBuf::from(dir);
    }

    if let Some(binary) = args.kubectl {
        config.kubectl.binary = binary;
    } else if !args.yes {
        config.kubectl.binary = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("kubectl binary")
            .default(config.kubectl.binary.clone())
            .interact_text()?;
    }

    config.ensure_dirs()?;
    config.save()?;

    println!(
        "{} Configuration saved to {}",
        "✓".green(),
        Config::config_path().display()
    );
    if !config.source.dir.is_dir() {
        println!(
            "{}",
            format!("○ {} does not exist yet", config.source.dir.display()).yellow()
        );
    }
    if config.kubectl_path().is_err() {
        println!(
            "{}",
            format!("○ {} not found in PATH", config.kubectl.binary).yellow()
        );
    }
    Ok(())
}

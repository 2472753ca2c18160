//! Cleanup command.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::Config;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

pub async fn execute(older_than_days: u64, config: &Config) -> Result<()> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(older_than_days * SECS_PER_DAY))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let cleaned = remove_older_than(&config.paths.cache_dir, cutoff)?;
    println!(
        "{} Cleaned up {} cached kubeconfig file{}",
        "✓".green(),
        cleaned,
        if cleaned == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Delete regular files in `dir` last modified before `cutoff`.
fn remove_older_than(dir: &Path, cutoff: SystemTime) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).context("Error reading cache directory"),
    };

    let mut cleaned = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => cleaned += 1,
            Err(e) => println!(
                "{}",
                format!("✗ Error removing {}: {}", entry.file_name().to_string_lossy(), e).red()
            ),
        }
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_older_than() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.cfg"), "a").unwrap();
        std::fs::write(temp.path().join("b.cfg"), "b").unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();

        let past = SystemTime::now() - Duration::from_secs(SECS_PER_DAY);
        assert_eq!(remove_older_than(temp.path(), past).unwrap(), 0);

        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(remove_older_than(temp.path(), future).unwrap(), 2);
        assert!(temp.path().join("nested").is_dir());
    }

    #[test]
    fn test_missing_cache_dir() {
        let temp = tempdir().unwrap();
        assert_eq!(remove_older_than(&temp.path().join("missing"), SystemTime::now()).unwrap(), 0);
    }
}

//! Verify command.
//!
//! Runs against whatever kubeconfig kubectl would use by default.

use anyhow::Result;
use colored::Colorize;
use kubconfig_core::control_plane::{KIND_CLUSTER_ROLE_BINDING, KIND_SERVICE_ACCOUNT, KubectlClient};

use crate::config::Config;

/// `(description, verb, kind, extra args)` for each permission we need.
const PERMISSION_CHECKS: &[(&str, &str, &str, &[&str])] = &[
    ("ServiceAccount creation permission", "create", KIND_SERVICE_ACCOUNT, &[]),
    ("ClusterRoleBinding creation permission", "create", KIND_CLUSTER_ROLE_BINDING, &[]),
    ("Secret access permission", "get", "secret", &["-n", "kube-system"]),
];

pub async fn execute(config: &Config) -> Result<()> {
    let kubectl = KubectlClient::new(config.kubectl_path()?);
    let mut issues = Vec::new();

    print!("  Cluster connectivity: ");
    match kubectl.cluster_info().await {
        Ok(()) => println!("{}", "✓".green()),
        Err(e) => {
            println!("{}", "✗".red());
            issues.push(format!("Cluster connectivity failed: {}", e));
        }
    }

    if issues.is_empty() {
        for (name, verb, kind, extra) in PERMISSION_CHECKS {
            print!("  {}: ", name);
            match kubectl.can_i(verb, kind, extra).await {
                Ok(true) => println!("{}", "✓".green()),
                Ok(false) => {
                    println!("{}", "✗ denied".red());
                    issues.push(format!("{} denied", name));
                }
                Err(e) => {
                    println!("{}", "✗".red());
                    issues.push(format!("{} failed: {}", name, e));
                }
            }
        }
    }

    println!();
    if issues.is_empty() {
        println!("{}", "✓ Cluster access verified".green().bold());
        Ok(())
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
        anyhow::bail!("Cluster access verification failed")
    }
}

//! Tunables for the session manager.
//!
//! The CLI embeds this as the `[session]` table of its config file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Namespace the temporary service accounts live in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// How many times to look for a freshly applied service account
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Delay between visibility polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Allowed drift between requested and issued token expiry
    #[serde(default = "default_token_tolerance")]
    pub token_tolerance_secs: i64,

    /// Interval of the background expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Overall deadline for creating a grant
    #[serde(default = "default_grant_deadline")]
    pub grant_deadline_secs: u64,

    /// Shortest session we will issue a token for
    #[serde(default = "default_min_ttl")]
    pub min_ttl_secs: i64,

    /// Longest session we will grant
    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: i64,

    /// Session length used when none is given
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: i64,
}

fn default_namespace() -> String {
    "kube-system".to_string()
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_token_tolerance() -> i64 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_grant_deadline() -> u64 {
    60
}

fn default_min_ttl() -> i64 {
    600 // 10 minutes
}

fn default_max_ttl() -> i64 {
    86_400 // 24 hours
}

fn default_ttl() -> i64 {
    28_800 // 8 hours
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            token_tolerance_secs: default_token_tolerance(),
            sweep_interval_secs: default_sweep_interval(),
            grant_deadline_secs: default_grant_deadline(),
            min_ttl_secs: default_min_ttl(),
            max_ttl_secs: default_max_ttl(),
            default_ttl_secs: default_ttl(),
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn grant_deadline(&self) -> Duration {
        Duration::from_secs(self.grant_deadline_secs)
    }

    pub fn min_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_ttl_secs)
    }

    pub fn max_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_ttl_secs)
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_ttl_secs)
    }

    /// Clamp a requested TTL into `[min_ttl, max_ttl]`.
    pub fn clamp_ttl(&self, ttl: chrono::Duration) -> chrono::Duration {
        ttl.clamp(self.min_ttl(), self.max_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.namespace, "kube-system");
        assert_eq!(config.poll_attempts, 10);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.token_tolerance_secs, 60);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.default_ttl(), chrono::Duration::hours(8));
    }

    #[test]
    fn test_clamp_ttl() {
        let config = SessionConfig::default();
        assert_eq!(
            config.clamp_ttl(chrono::Duration::minutes(2)),
            chrono::Duration::minutes(10)
        );
        assert_eq!(
            config.clamp_ttl(chrono::Duration::hours(30)),
            chrono::Duration::hours(24)
        );
        assert_eq!(
            config.clamp_ttl(chrono::Duration::hours(1)),
            chrono::Duration::hours(1)
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"poll_attempts": 3}"#).unwrap();
        assert_eq!(config.poll_attempts, 3);
        assert_eq!(config.namespace, "kube-system");
        assert_eq!(config.max_ttl_secs, 86_400);
    }
}

//! Bounded token issuance.
//!
//! Tokens are minted by the control plane for a service account and are
//! checked against the session they were requested for before use.

pub mod expiry;

use crate::config::SessionConfig;
use crate::control_plane::ControlPlaneClient;
use crate::error::Result;
use crate::grant::wait_for_identity;
use crate::session::AccessSession;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A bearer token together with its verified expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// Never print the token itself
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct TokenIssuer {
    client: Arc<dyn ControlPlaneClient>,
    config: SessionConfig,
}

impl TokenIssuer {
    pub fn new(client: Arc<dyn ControlPlaneClient>, config: SessionConfig) -> Self {
        Self { client, config }
    }

    /// Issue a token for `session`'s service account.
    ///
    /// Sessions shorter than the minimum duration are extended in place,
    /// so the caller registers the expiry the token actually carries.
    pub async fn issue_token(&self, session: &mut AccessSession) -> Result<Token> {
        wait_for_identity(
            self.client.as_ref(),
            &session.name,
            &session.namespace,
            self.config.poll_attempts,
            self.config.poll_interval(),
        )
        .await?;

        let now = Utc::now();
        let min_ttl = self.config.min_ttl();
        if session.expires_at - now < min_ttl {
            let extended = now + min_ttl;
            warn!(
                session_id = %session.session_id,
                requested = %session.expires_at,
                extended = %extended,
                "Session shorter than minimum token duration, extending"
            );
            session.expires_at = extended;
        }

        let ttl_seconds = (session.expires_at - now).num_seconds();
        debug!(name = %session.name, ttl_seconds, "Requesting token");
        let value = self
            .client
            .issue_bounded_token(&session.name, &session.namespace, ttl_seconds)
            .await?;

        let expires_at =
            expiry::verify(&value, session.expires_at, self.config.token_tolerance_secs)?;

        info!(
            session_id = %session.session_id,
            expires_at = %expires_at,
            "Token issued"
        );
        Ok(Token { value, expires_at })
    }
}

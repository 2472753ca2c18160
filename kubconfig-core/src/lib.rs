//! kubconfig-core - Core library for kubconfig
//!
//! This crate provides the temporary-access session manager used by the
//! kubconfig CLI:
//!
//! - **session**: Session records and the in-memory session registry
//! - **grant**: Service account + cluster role binding lifecycle
//! - **token**: Bounded token issuance and expiry verification
//! - **cleanup**: Background sweep of expired sessions
//! - **control_plane**: kubectl-backed cluster access (plus an in-memory fake)
//! - **kubeconfig**: Typed view over the few kubeconfig fields we touch
//! - **source**: Where kubeconfig documents come from
//! - **service**: Activation / deactivation flows

pub mod cleanup;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod grant;
pub mod kubeconfig;
pub mod service;
pub mod session;
pub mod source;
pub mod token;

// Re-export commonly used types
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use service::AccessService;
pub use session::{AccessSession, SessionRegistry};

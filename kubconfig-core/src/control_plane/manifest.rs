//! Manifests for the temporary service account and its admin binding.

use crate::error::Result;
use crate::session::{self, AccessSession};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MANAGED_BY_LABEL: &str = "kubconfig.io/managed-by";
pub const USER_LABEL: &str = "kubconfig.io/user";
pub const CREATED_BY_ANNOTATION: &str = "kubconfig.io/created-by";
pub const CREATED_AT_ANNOTATION: &str = "kubconfig.io/created-at";
pub const CREATED_ON_ANNOTATION: &str = "kubconfig.io/created-on";
pub const MANAGER: &str = "kubconfig-cli";

/// Role granted to temporary identities.
pub const ADMIN_ROLE: &str = "cluster-admin";

/// Longest value Kubernetes accepts for a label.
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Resource<'a> {
    api_version: &'a str,
    kind: &'a str,
    metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    subjects: Option<Vec<Subject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_ref: Option<RoleRef>,
}

#[derive(Debug, Serialize)]
struct Metadata {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    labels: BTreeMap<&'static str, String>,
    annotations: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct Subject {
    kind: &'static str,
    name: String,
    namespace: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleRef {
    kind: &'static str,
    name: &'static str,
    api_group: &'static str,
}

/// Render the ServiceAccount + ClusterRoleBinding pair for a session.
///
/// Both resources carry ownership labels and audit annotations.
pub fn render_grant(session: &AccessSession, host: &str) -> Result<String> {
    let labels = BTreeMap::from([
        (MANAGED_BY_LABEL, MANAGER.to_string()),
        (USER_LABEL, user_label(session)),
    ]);
    let annotations = BTreeMap::from([
        (CREATED_BY_ANNOTATION, session.principal.clone()),
        (CREATED_AT_ANNOTATION, session.created_at.to_rfc3339()),
        (CREATED_ON_ANNOTATION, host.to_string()),
    ]);

    let account = Resource {
        api_version: "v1",
        kind: "ServiceAccount",
        metadata: Metadata {
            name: session.name.clone(),
            namespace: Some(session.namespace.clone()),
            labels: labels.clone(),
            annotations: annotations.clone(),
        },
        subjects: None,
        role_ref: None,
    };

    let binding = Resource {
        api_version: "rbac.authorization.k8s.io/v1",
        kind: "ClusterRoleBinding",
        metadata: Metadata {
            name: session.binding_name(),
            namespace: None,
            labels,
            annotations,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount",
            name: session.name.clone(),
            namespace: session.namespace.clone(),
        }]),
        role_ref: Some(RoleRef {
            kind: "ClusterRole",
            name: ADMIN_ROLE,
            api_group: "rbac.authorization.k8s.io",
        }),
    };

    Ok(format!(
        "{}---\n{}",
        serde_yaml::to_string(&account)?,
        serde_yaml::to_string(&binding)?
    ))
}

/// Label value for the session's user: the sanitized identity name without
/// its suffix, cut to the label length limit. The raw principal only goes
/// into annotations.
fn user_label(session: &AccessSession) -> String {
    let base = session::principal_from_identity(&session.name);
    let cut = base.get(..MAX_LABEL_LEN).unwrap_or(base);
    cut.trim_end_matches('-').to_string()
}

/// Host name recorded in the `created-on` annotation.
pub fn local_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

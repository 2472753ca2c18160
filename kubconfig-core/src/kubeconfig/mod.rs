//! Typed view over the handful of kubeconfig fields we read and write.
//!
//! The document is kept as a `serde_yaml::Value` so everything we do not
//! touch (extensions, exec plugins, preferences) survives a round trip.
//! Besides `users[0].user.token`, only the context and user names are
//! rewritten, so `contexts[0].name` always reads `<identity>@<cluster>`.

use crate::error::{Error, Result};
use crate::session::AccessSession;
use serde_yaml::{Mapping, Value};

const SECTIONS: [&str; 3] = ["clusters", "contexts", "users"];

#[derive(Debug, Clone, PartialEq)]
pub struct KubeconfigDocument {
    root: Value,
}

impl KubeconfigDocument {
    /// Parse and validate a document.
    ///
    /// `clusters`, `contexts` and `users` must each hold exactly one entry.
    pub fn parse(raw: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(raw)
            .map_err(|e| Error::malformed("document", e.to_string()))?;
        if !root.is_mapping() {
            return Err(Error::malformed("document", "not a mapping"));
        }

        for section in SECTIONS {
            match root.get(section) {
                Some(Value::Sequence(entries)) if entries.len() == 1 => {
                    if !entries[0].is_mapping() {
                        return Err(Error::malformed(
                            format!("{}[0]", section),
                            "not a mapping",
                        ));
                    }
                }
                Some(Value::Sequence(entries)) => {
                    return Err(Error::malformed(
                        section,
                        format!("expected exactly one entry, found {}", entries.len()),
                    ));
                }
                Some(_) => return Err(Error::malformed(section, "not a list")),
                None => return Err(Error::malformed(section, "missing")),
            }
        }

        Ok(Self { root })
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let raw = std::str::from_utf8(raw)
            .map_err(|e| Error::malformed("document", format!("not UTF-8: {}", e)))?;
        Self::parse(raw)
    }

    /// Build a standalone document for a session.
    pub fn generate(session: &AccessSession, token: &str, ca_data: &str) -> Result<Self> {
        let context = session.context_name();
        let doc = serde_yaml::to_string(&serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{
                "name": session.cluster_name,
                "cluster": {
                    "server": session.server_url,
                    "certificate-authority-data": ca_data,
                },
            }],
            "contexts": [{
                "name": context,
                "context": {
                    "cluster": session.cluster_name,
                    "user": session.name,
                    "namespace": session.namespace,
                },
            }],
            "current-context": context,
            "users": [{
                "name": session.name,
                "user": { "token": token },
            }],
        }))?;
        Self::parse(&doc)
    }

    fn entry(&self, section: &str) -> &Value {
        // Presence and shape are checked in `parse`
        &self.root[section][0]
    }

    fn string_at<'a>(value: &'a Value, path: &[&str], field: &str) -> Result<&'a str> {
        let mut current = value;
        for key in path {
            current = current
                .get(*key)
                .ok_or_else(|| Error::malformed(field, "missing"))?;
        }
        current
            .as_str()
            .ok_or_else(|| Error::malformed(field, "not a string"))
    }

    pub fn cluster_name(&self) -> Result<&str> {
        Self::string_at(self.entry("clusters"), &["name"], "clusters[0].name")
    }

    pub fn server(&self) -> Result<&str> {
        Self::string_at(
            self.entry("clusters"),
            &["cluster", "server"],
            "clusters[0].cluster.server",
        )
    }

    pub fn certificate_authority_data(&self) -> Option<&str> {
        self.entry("clusters")
            .get("cluster")?
            .get("certificate-authority-data")?
            .as_str()
    }

    pub fn context_name(&self) -> Result<&str> {
        Self::string_at(self.entry("contexts"), &["name"], "contexts[0].name")
    }

    /// Split `contexts[0].name` into `(identity, cluster)`.
    pub fn identity_from_context(&self) -> Result<(&str, &str)> {
        let context = self.context_name()?;
        match context.split_once('@') {
            Some((identity, cluster)) if !identity.is_empty() && !cluster.is_empty() => {
                Ok((identity, cluster))
            }
            _ => Err(Error::malformed(
                "contexts[0].name",
                format!("expected <identity>@<cluster>, got {:?}", context),
            )),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.entry("users").get("user")?.get("token")?.as_str()
    }

    /// Overwrite `users[0].user.token`, creating the `user` map if needed.
    pub fn set_token(&mut self, token: &str) -> Result<()> {
        let user_entry = self.root["users"][0]
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("users[0]", "not a mapping"))?;

        let user = user_entry
            .entry(Value::from("user"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        let user = user
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("users[0].user", "not a mapping"))?;

        user.insert(Value::from("token"), Value::from(token));
        Ok(())
    }

    /// Point the context and user names at `session`'s service account.
    ///
    /// Renames `contexts[0].name`, `current-context`, `contexts[0].context.user`
    /// and `users[0].name`. The cluster entry is left alone.
    pub fn set_identity(&mut self, session: &AccessSession) -> Result<()> {
        let context_name = session.context_name();

        let context_entry = self.root["contexts"][0]
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("contexts[0]", "not a mapping"))?;
        context_entry.insert(Value::from("name"), Value::from(context_name.as_str()));
        let context = context_entry
            .entry(Value::from("context"))
            .or_insert_with(|| Value::Mapping(Mapping::new()))
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("contexts[0].context", "not a mapping"))?;
        context.insert(Value::from("user"), Value::from(session.name.as_str()));

        let user_entry = self.root["users"][0]
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("users[0]", "not a mapping"))?;
        user_entry.insert(Value::from("name"), Value::from(session.name.as_str()));

        let root = self
            .root
            .as_mapping_mut()
            .ok_or_else(|| Error::malformed("document", "not a mapping"))?;
        root.insert(Value::from("current-context"), Value::from(context_name));
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }
}

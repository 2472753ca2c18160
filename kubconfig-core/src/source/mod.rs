//! Where kubeconfig documents come from.
//!
//! Documents are addressed by a `.cfg` name. [`DirectoryStore`] serves them
//! from a local directory and keeps a copy of every fetched document in the
//! cache directory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DOCUMENT_EXTENSION: &str = ".cfg";

/// Check a document name: non-empty, a plain file name, ending in `.cfg`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("kubeconfig name cannot be empty".into()));
    }
    if !name.ends_with(DOCUMENT_EXTENSION) || name.len() == DOCUMENT_EXTENSION.len() {
        return Err(Error::InvalidName(format!(
            "kubeconfig name must end with {}: {}",
            DOCUMENT_EXTENSION, name
        )));
    }
    if name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(Error::InvalidName(format!(
            "kubeconfig name must be a plain file name: {}",
            name
        )));
    }
    Ok(())
}

/// Read-only store of kubeconfig documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Names of every available document, sorted.
    async fn list(&self) -> Result<Vec<String>>;

    async fn fetch(&self, name: &str) -> Result<Vec<u8>>;
}

/// [`BlobStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    cache_dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cached copy of `name`.
    pub fn cached_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cached_path(name).is_file()
    }

    async fn write_cache(&self, name: &str, data: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.cached_path(name);
        tokio::fs::write(&path, data).await?;
        restrict_permissions(&path).await?;
        debug!("Cached {} at {:?}", name, path);
        Ok(())
    }
}

/// Make a file readable by its owner only.
#[cfg(unix)]
pub async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
pub async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl BlobStore for DirectoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;

        let path = self.dir.join(name);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    kind: "kubeconfig".to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.write_cache(name, &data).await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, DirectoryStore) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        let store = DirectoryStore::new(source, temp.path().join("cache"));
        (temp, store)
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("prod.cfg").is_ok());
        assert!(validate_name("team-a.staging.cfg").is_ok());

        for bad in ["", ".cfg", "prod", "prod.yaml", "../prod.cfg", "a/b.cfg", ".hidden.cfg"] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let (_temp, store) = store();
        for name in ["b.cfg", "a.cfg", "notes.txt"] {
            std::fs::write(store.dir().join(name), "x").unwrap();
        }
        std::fs::create_dir(store.dir().join("nested.cfg")).unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a.cfg", "b.cfg"]);
    }

    #[tokio::test]
    async fn test_fetch_caches_document() {
        let (_temp, store) = store();
        std::fs::write(store.dir().join("prod.cfg"), "apiVersion: v1\n").unwrap();
        assert!(!store.is_cached("prod.cfg"));

        let data = store.fetch("prod.cfg").await.unwrap();
        assert_eq!(data, b"apiVersion: v1\n");
        assert!(store.is_cached("prod.cfg"));
        assert_eq!(std::fs::read(store.cached_path("prod.cfg")).unwrap(), data);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.cached_path("prod.cfg"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let (_temp, store) = store();
        assert!(matches!(
            store.fetch("ghost.cfg").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.fetch("ghost.yaml").await,
            Err(Error::InvalidName(_))
        ));
    }
}

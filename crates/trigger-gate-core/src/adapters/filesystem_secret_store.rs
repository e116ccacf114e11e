//! # Filesystem Secret Store
//!
//! Reads secrets laid out the way Kubernetes mounts them into a pod:
//! `<root>/<namespace>/<name>/<key>`, one file per key holding the raw bytes.

use crate::secrets::{SecretData, SecretStore, SecretStoreError, SecretValue};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};

/// Filesystem-based secret store
///
/// A missing secret directory means the secret does not exist. Entries whose
/// name starts with `.` (the `..data` bookkeeping links of projected volumes)
/// and subdirectories are skipped.
///
/// # Examples
///
/// ```no_run
/// use trigger_gate_core::adapters::FilesystemSecretStore;
/// use std::path::PathBuf;
///
/// let store = FilesystemSecretStore::new(PathBuf::from("/var/run/trigger-gate/secrets"));
/// assert_eq!(store.root(), std::path::Path::new("/var/run/trigger-gate/secrets"));
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemSecretStore {
    root: PathBuf,
}

impl FilesystemSecretStore {
    /// Create a store rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn secret_dir(&self, namespace: &str, name: &str) -> Result<PathBuf, SecretStoreError> {
        validate_component(namespace)?;
        validate_component(name)?;
        Ok(self.root.join(namespace).join(name))
    }
}

/// Reject path components that could escape the store root.
fn validate_component(value: &str) -> Result<(), SecretStoreError> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains('/') || value.contains('\\') {
        Some("must not contain path separators")
    } else if value == "." || value.contains("..") {
        Some("must not contain relative path segments")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SecretStoreError::InvalidName {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn io_error(path: &Path, namespace: &str, name: &str, err: std::io::Error) -> SecretStoreError {
    match err.kind() {
        ErrorKind::PermissionDenied => SecretStoreError::AccessDenied {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: err.to_string(),
        },
        _ => SecretStoreError::Unavailable {
            message: format!("failed to read {}: {}", path.display(), err),
        },
    }
}

#[async_trait]
impl SecretStore for FilesystemSecretStore {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, SecretStoreError> {
        let dir = self.secret_dir(namespace, name)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %dir.display(), "Secret directory does not exist");
                return Ok(None);
            }
            Err(e) => return Err(io_error(&dir, namespace, name, e)),
        };

        let mut data = SecretData::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&dir, namespace, name, e))?
        {
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str() else {
                warn!(path = %entry.path().display(), "Skipping secret key with non UTF-8 name");
                continue;
            };
            if key.starts_with('.') {
                continue;
            }

            let path = entry.path();
            // Follows symlinks, which is how projected volumes expose keys.
            let metadata = fs::metadata(&path)
                .await
                .map_err(|e| io_error(&path, namespace, name, e))?;
            if !metadata.is_file() {
                continue;
            }

            let bytes = fs::read(&path)
                .await
                .map_err(|e| io_error(&path, namespace, name, e))?;
            data.insert(key.to_string(), SecretValue::from_bytes(bytes));
        }

        debug!(
            namespace = %namespace,
            secret_name = %name,
            keys = data.len(),
            "Loaded secret from filesystem"
        );
        Ok(Some(data))
    }
}

#[cfg(test)]
#[path = "filesystem_secret_store_tests.rs"]
mod tests;

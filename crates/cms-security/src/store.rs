//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Role assignment storage backends."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::rbac::RoleSet;

/// Identifier for a dashboard user (e-mail address in practice).
pub type UserId = String;

/// Errors returned by role stores. Only raised when the backing storage itself fails.
#[derive(Debug, Error)]
pub enum RoleStoreError {
    #[error("role store i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("role store {path} is not a valid role document: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode role document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read/write contract for user role assignments.
///
/// Writes replace the whole assignment of a user; the last writer wins.
#[async_trait]
pub trait RoleStore: Send + Sync + 'static {
    /// Currently assigned roles, empty when the user has none.
    async fn roles(&self, user_id: &str) -> Result<RoleSet, RoleStoreError>;

    /// Replace the assignment of `user_id` with `roles`.
    async fn set_roles(&self, user_id: &str, roles: RoleSet) -> Result<(), RoleStoreError>;
}

/// Shared handle passed to consumers.
pub type SharedRoleStore = Arc<dyn RoleStore>;

/// Process-local store, used in tests and the open demo mode.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRoleStore {
    assignments: Arc<RwLock<HashMap<UserId, RoleSet>>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn roles(&self, user_id: &str) -> Result<RoleSet, RoleStoreError> {
        Ok(self
            .assignments
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_roles(&self, user_id: &str, roles: RoleSet) -> Result<(), RoleStoreError> {
        self.assignments.write().insert(user_id.to_owned(), roles);
        Ok(())
    }
}

/// Store persisting every assignment in one JSON document keyed by user id.
///
/// The document is rewritten through a sibling temp file followed by a rename.
#[derive(Debug)]
pub struct JsonFileRoleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<UserId, RoleSet>, RoleStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(RoleStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| RoleStoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_document(
        &self,
        document: &BTreeMap<UserId, RoleSet>,
    ) -> Result<(), RoleStoreError> {
        let io_err = |source| RoleStoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let encoded = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for JsonFileRoleStore {
    async fn roles(&self, user_id: &str) -> Result<RoleSet, RoleStoreError> {
        let document = self.read_document().await?;
        Ok(document.get(user_id).cloned().unwrap_or_default())
    }

    async fn set_roles(&self, user_id: &str, roles: RoleSet) -> Result<(), RoleStoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(user_id.to_owned(), roles);
        self.write_document(&document).await?;
        debug!(path = %self.path.display(), user_id, "role document written");
        Ok(())
    }
}

//! Root manager (§4.9): client-supplied filesystem roots with permission and
//! path-containment checks.

use std::collections::HashMap;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::types::{Root, RootPermissions};
use tokio::sync::RwLock;

/// The operation being attempted against a root-scoped path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOperation {
    /// Read file contents / resource bodies.
    Read,
    /// Create, update, or delete.
    Write,
    /// Enumerate directory entries.
    List,
    /// Register a filesystem watch.
    Watch,
}

impl RootOperation {
    fn permission_bit(self, permissions: &RootPermissions) -> bool {
        match self {
            RootOperation::Read => permissions.read,
            RootOperation::Write => permissions.write,
            RootOperation::List => permissions.list,
            RootOperation::Watch => permissions.watch,
        }
    }
}

struct RootRecord {
    root: Root,
    added: i64,
    last_used: i64,
}

/// Tracks registered roots and enforces containment + permission checks
/// before any path access.
pub struct RootManager {
    roots: RwLock<HashMap<String, RootRecord>>,
}

impl Default for RootManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RootManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `uri` with `permissions` (default: read + list only).
    pub async fn add_root(&self, uri: &str, name: Option<String>, permissions: RootPermissions) {
        let now = mcpmux_transport::now_unix();
        self.roots.write().await.insert(
            uri.to_owned(),
            RootRecord {
                root: Root {
                    uri: uri.to_owned(),
                    name,
                    permissions,
                },
                added: now,
                last_used: now,
            },
        );
    }

    /// Removes a previously registered root.
    pub async fn remove_root(&self, uri: &str) {
        self.roots.write().await.remove(uri);
    }

    /// The registered roots, for `roots/list`.
    pub async fn list_roots(&self) -> Vec<Root> {
        self.roots.read().await.values().map(|r| r.root.clone()).collect()
    }

    /// Checks that `path` is contained within some registered root that
    /// grants `op`. Returns the normalized path on success, or an
    /// `AuthorizationError` otherwise.
    pub async fn check_root_access(&self, path: &str, op: RootOperation) -> McpResult<String> {
        let normalized = normalize_path(path);
        let mut roots = self.roots.write().await;

        let hit = roots.values_mut().find(|record| {
            let root_path = normalize_path(&record.root.uri);
            contains(&root_path, &normalized) && op.permission_bit(&record.root.permissions)
        });

        match hit {
            Some(record) => {
                record.last_used = mcpmux_transport::now_unix();
                Ok(normalized)
            }
            None => Err(McpError::new(
                mcpmux_core::McpErrorCode::AuthorizationError,
                format!("path {path} is not accessible for {op:?}"),
            )
            .with_context("path", path)),
        }
    }
}

/// Normalizes a root or access URI to its path form: strips a `file://`
/// prefix and collapses `.`/`..` segments and duplicate separators.
fn normalize_path(uri: &str) -> String {
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// A normalized path `p` is contained in root `r` iff `p == r` or `p` begins
/// with `r` followed by a path separator.
fn contains(root: &str, path: &str) -> bool {
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
        || (root == "/" && path.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s5_scenario_root_enforcement() {
        let manager = RootManager::new();
        manager
            .add_root(
                "file:///data",
                None,
                RootPermissions {
                    read: true,
                    write: false,
                    list: true,
                    watch: false,
                },
            )
            .await;

        assert!(manager.check_root_access("/data/a.txt", RootOperation::Read).await.is_ok());

        let write_err = manager
            .check_root_access("/data/a.txt", RootOperation::Write)
            .await
            .unwrap_err();
        assert_eq!(write_err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());

        let outside_err = manager
            .check_root_access("/etc/passwd", RootOperation::Read)
            .await
            .unwrap_err();
        assert_eq!(outside_err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());
    }

    #[tokio::test]
    async fn exact_root_path_itself_is_accessible() {
        let manager = RootManager::new();
        manager
            .add_root("file:///data", None, RootPermissions::default_grant())
            .await;
        assert!(manager.check_root_access("/data", RootOperation::Read).await.is_ok());
    }

    #[tokio::test]
    async fn sibling_path_with_shared_prefix_is_not_contained() {
        let manager = RootManager::new();
        manager
            .add_root("file:///data", None, RootPermissions::default_grant())
            .await;
        let err = manager
            .check_root_access("/database/x", RootOperation::Read)
            .await
            .unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());
    }

    #[tokio::test]
    async fn dot_dot_segments_are_collapsed_before_containment_check() {
        let manager = RootManager::new();
        manager
            .add_root("file:///data", None, RootPermissions::default_grant())
            .await;
        let err = manager
            .check_root_access("/data/../etc/passwd", RootOperation::Read)
            .await
            .unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());
    }

    #[tokio::test]
    async fn watch_requires_the_watch_bit() {
        let manager = RootManager::new();
        manager
            .add_root(
                "file:///data",
                None,
                RootPermissions {
                    read: true,
                    write: false,
                    list: true,
                    watch: false,
                },
            )
            .await;
        let err = manager
            .check_root_access("/data/a.txt", RootOperation::Watch)
            .await
            .unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());
    }
}

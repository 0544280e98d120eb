//! Per-caller workspace partitioning inside a persistent environment
//!
//! Workspaces are plain subdirectories of `<working-root>/workspaces`,
//! keyed by a generated token. Isolation is advisory directory
//! partitioning: different tokens do not collide at the path level, but
//! nothing stops a caller holding another workspace's absolute path from
//! addressing it. Container paths are POSIX strings throughout.

use crate::docker::ContainerEngine;
use crate::error::{Result, SandboxError};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const WORKSPACES_DIR: &str = "workspaces";

#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub id: String,
    pub path: String,
}

#[derive(Clone)]
pub struct WorkspaceManager {
    engine: Arc<dyn ContainerEngine>,
    working_root: String,
}

impl WorkspaceManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, working_root: String) -> Self {
        Self {
            engine,
            working_root,
        }
    }

    pub fn workspace_path(&self, workspace_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.working_root.trim_end_matches('/'),
            WORKSPACES_DIR,
            workspace_id
        )
    }

    /// Allocate a fresh workspace. Each call yields a new token; creation
    /// is deliberately not idempotent.
    pub async fn create(&self, container_id: &str) -> Result<Workspace> {
        let id = Uuid::new_v4().to_string();
        let path = self.workspace_path(&id);
        self.engine
            .exec(
                container_id,
                vec!["mkdir".to_string(), "-p".to_string(), path.clone()],
                None,
            )
            .await?;
        info!(container_id = %container_id, workspace_id = %id, "workspace created");
        Ok(Workspace { id, path })
    }

    /// The scoped base: the workspace root when a workspace is in play,
    /// the environment working-root otherwise.
    pub fn base_dir(&self, workspace_id: Option<&str>) -> String {
        match workspace_id {
            Some(id) => self.workspace_path(id),
            None => self.working_root.clone(),
        }
    }

    /// Resolve a destination directory under the scoped base.
    pub fn resolve_dir(&self, workspace_id: Option<&str>, subdir: Option<&str>) -> Result<String> {
        let base = self.base_dir(workspace_id);
        match subdir {
            None => Ok(base),
            Some(dir) => Ok(join(&base, sanitize_relative(dir)?)),
        }
    }

    /// Resolve a destination file path under the scoped base.
    pub fn resolve_file(&self, workspace_id: Option<&str>, dest_path: &str) -> Result<String> {
        let base = self.base_dir(workspace_id);
        Ok(join(&base, sanitize_relative(dest_path)?))
    }

    /// Recursively remove the workspace subtree. The environment itself
    /// is untouched.
    pub async fn clean(&self, container_id: &str, workspace_id: &str) -> Result<String> {
        let path = self.workspace_path(workspace_id);
        self.engine
            .exec(
                container_id,
                vec!["rm".to_string(), "-rf".to_string(), path.clone()],
                None,
            )
            .await?;
        info!(container_id = %container_id, workspace_id = %workspace_id, "workspace removed");
        Ok(path)
    }
}

/// Reinterpret a caller-supplied path as relative to the scoped root.
///
/// Leading separators are stripped so an absolute-looking input cannot
/// escape the root; parent-directory components are rejected outright.
pub fn sanitize_relative(path: &str) -> Result<&str> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.split('/').any(|component| component == "..") {
        return Err(SandboxError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

fn join(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    fn manager() -> WorkspaceManager {
        WorkspaceManager::new(Arc::new(MockEngine::new()), "/app".to_string())
    }

    #[test]
    fn sanitize_strips_leading_separators() {
        assert_eq!(sanitize_relative("/etc/passwd").unwrap(), "etc/passwd");
        assert_eq!(sanitize_relative("//double").unwrap(), "double");
        assert_eq!(sanitize_relative("plain/file.txt").unwrap(), "plain/file.txt");
    }

    #[test]
    fn sanitize_rejects_parent_components() {
        assert!(matches!(
            sanitize_relative("../escape"),
            Err(SandboxError::InvalidPath(_))
        ));
        assert!(matches!(
            sanitize_relative("a/../../b"),
            Err(SandboxError::InvalidPath(_))
        ));
        assert!(matches!(
            sanitize_relative("/abs/../b"),
            Err(SandboxError::InvalidPath(_))
        ));
    }

    #[test]
    fn sanitize_keeps_dotted_names() {
        assert_eq!(sanitize_relative("a/..b/c.txt").unwrap(), "a/..b/c.txt");
        assert_eq!(sanitize_relative(".hidden").unwrap(), ".hidden");
    }

    #[test]
    fn resolved_dirs_stay_under_the_scoped_root() {
        let manager = manager();
        assert_eq!(manager.resolve_dir(None, None).unwrap(), "/app");
        assert_eq!(
            manager.resolve_dir(None, Some("/data/out")).unwrap(),
            "/app/data/out"
        );
        assert_eq!(
            manager.resolve_dir(Some("ws1"), Some("sub")).unwrap(),
            "/app/workspaces/ws1/sub"
        );
    }

    #[test]
    fn resolve_file_scopes_to_workspace_when_present() {
        let manager = manager();
        assert_eq!(
            manager.resolve_file(Some("ws1"), "/abs/name.txt").unwrap(),
            "/app/workspaces/ws1/abs/name.txt"
        );
        assert_eq!(
            manager.resolve_file(None, "name.txt").unwrap(),
            "/app/name.txt"
        );
    }
}

//! File and directory transfer between the local filesystem and an
//! environment, over the engine's tar-stream archive capability.

use crate::docker::ContainerEngine;
use crate::error::{Result, SandboxError};
use crate::workspace::WorkspaceManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct TransferOrchestrator {
    engine: Arc<dyn ContainerEngine>,
    workspaces: WorkspaceManager,
}

impl TransferOrchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>, workspaces: WorkspaceManager) -> Self {
        Self { engine, workspaces }
    }

    /// Write text content to a file in the environment.
    pub async fn write_text(
        &self,
        container_id: &str,
        file_name: &str,
        contents: &str,
        workspace_id: Option<&str>,
        dest_dir: Option<&str>,
    ) -> Result<String> {
        let target_dir = self.workspaces.resolve_dir(workspace_id, dest_dir)?;
        self.ensure_dir(container_id, &target_dir).await?;

        let file_path = format!("{}/{}", target_dir.trim_end_matches('/'), file_name);
        info!(container_id = %container_id, file_path = %file_path, "writing file");

        let stream = tarball::from_bytes(file_name, contents.as_bytes())?;
        self.engine
            .put_archive(container_id, &target_dir, stream)
            .await?;
        Ok(file_path)
    }

    /// Copy a single local file into the environment.
    pub async fn copy_file_in(
        &self,
        container_id: &str,
        local_src: &Path,
        workspace_id: Option<&str>,
        dest_path: Option<&str>,
    ) -> Result<String> {
        if !local_src.exists() {
            return Err(SandboxError::LocalNotFound(local_src.to_path_buf()));
        }

        let dest = match dest_path {
            Some(path) => path.to_string(),
            None => local_src
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let full_path = self.workspaces.resolve_file(workspace_id, &dest)?;

        // The base always starts with '/', so a separator is present.
        let (parent, arcname) = full_path
            .rsplit_once('/')
            .map(|(p, n)| (p.to_string(), n.to_string()))
            .unwrap_or_else(|| (String::new(), full_path.clone()));
        self.ensure_dir(container_id, &parent).await?;

        info!(
            container_id = %container_id,
            local_src = %local_src.display(),
            file_path = %full_path,
            "copying file in"
        );
        let stream = tarball::from_file(local_src, &arcname)?;
        self.engine
            .put_archive(container_id, &parent, stream)
            .await?;
        Ok(full_path)
    }

    /// Copy a local directory tree into the environment, preserved under
    /// the source directory's base name.
    pub async fn copy_tree_in(
        &self,
        container_id: &str,
        local_dir: &Path,
        workspace_id: Option<&str>,
        dest_dir: Option<&str>,
    ) -> Result<String> {
        if !local_dir.is_dir() {
            return Err(SandboxError::LocalNotFound(local_dir.to_path_buf()));
        }

        let target_dir = self.workspaces.resolve_dir(workspace_id, dest_dir)?;
        self.ensure_dir(container_id, &target_dir).await?;

        let root_name = local_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tree".to_string());
        info!(
            container_id = %container_id,
            local_dir = %local_dir.display(),
            dest_dir = %target_dir,
            "copying tree in"
        );
        let stream = tarball::from_tree(local_dir, &root_name)?;
        self.engine
            .put_archive(container_id, &target_dir, stream)
            .await?;
        Ok(target_dir)
    }

    /// Copy a file out of the environment to the local filesystem.
    ///
    /// A non-absolute remote path is rooted under the workspace when one
    /// is given. Returns the local path and the byte size written.
    pub async fn copy_file_out(
        &self,
        container_id: &str,
        remote_path: &str,
        workspace_id: Option<&str>,
        local_dest: Option<&Path>,
    ) -> Result<(PathBuf, u64)> {
        let remote = match workspace_id {
            Some(ws) if !remote_path.starts_with('/') => {
                format!("{}/{}", self.workspaces.workspace_path(ws), remote_path)
            }
            _ => remote_path.to_string(),
        };

        let local = match local_dest {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(remote.rsplit('/').next().unwrap_or(&remote)),
        };

        info!(
            container_id = %container_id,
            remote_path = %remote,
            local_path = %local.display(),
            "copying file out"
        );
        let stream = self.engine.get_archive(container_id, &remote).await?;
        let size = tarball::unpack_first(&stream, &local)?;
        Ok((local, size))
    }

    /// Recursively and idempotently create a destination directory before
    /// anything is written there.
    async fn ensure_dir(&self, container_id: &str, dir: &str) -> Result<()> {
        if dir.is_empty() {
            return Ok(());
        }
        let output = self
            .engine
            .exec(
                container_id,
                vec!["mkdir".to_string(), "-p".to_string(), dir.to_string()],
                None,
            )
            .await?;
        if output.exit_code != 0 {
            return Err(SandboxError::Engine {
                operation: "mkdir",
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

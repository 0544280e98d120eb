//! Boundary operations
//!
//! Each operation returns a structured envelope with a success flag:
//! payload fields are present only on success, the error message only on
//! failure. Every adapter and codec failure is caught here, logged with
//! context, and converted to a failure envelope; nothing escapes past
//! this boundary. Callers must check `success` before trusting any other
//! field.

use crate::config::Config;
use crate::docker::{ContainerEngine, DockerEngine};
use crate::error::{Result, SandboxError};
use crate::exec::{CommandResult, ExecutionOrchestrator};
use crate::registry::{EnvironmentMode, EnvironmentRegistry};
use crate::transfer::TransferOrchestrator;
use crate::workspace::WorkspaceManager;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Success/error envelope returned by every boundary operation.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OpResult<T> {
    Success {
        success: bool,
        #[serde(flatten)]
        data: T,
    },
    Error {
        success: bool,
        error: String,
    },
}

impl<T> OpResult<T> {
    fn ok(data: T) -> Self {
        Self::Success {
            success: true,
            data,
        }
    }

    fn err(message: impl Display) -> Self {
        Self::Error {
            success: false,
            error: message.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }

    /// The payload, panicking on a failure envelope. Test helper.
    pub fn unwrap_data(&self) -> &T {
        match self {
            Self::Success { data, .. } => data,
            Self::Error { error, .. } => panic!("operation failed: {}", error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitializeOutput {
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
    pub mode: EnvironmentMode,
}

#[derive(Debug, Serialize)]
pub struct ExecuteOutput {
    pub results: Vec<CommandResult>,
}

#[derive(Debug, Serialize)]
pub struct WriteFileOutput {
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct CopyFileInOutput {
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct CopyTreeInOutput {
    pub dest_dir: String,
}

#[derive(Debug, Serialize)]
pub struct CopyFileOutOutput {
    pub local_path: String,
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageOutput {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LogsOutput {
    pub logs: String,
}

struct SandboxInner {
    engine: Arc<dyn ContainerEngine>,
    config: Config,
    registry: EnvironmentRegistry,
    workspaces: WorkspaceManager,
    exec: ExecutionOrchestrator,
    transfer: TransferOrchestrator,
}

/// The sandbox operation facade.
///
/// Engine reachability is established exactly once, at construction;
/// when the engine is unreachable every operation short-circuits with
/// the same failure envelope instead of retrying per call.
pub struct Sandbox {
    inner: Option<SandboxInner>,
}

impl Sandbox {
    /// Connect to the local container engine. An unreachable engine is a
    /// permanent condition for this process; the facade still constructs
    /// so the boundary can report the failure per operation.
    pub async fn connect(config: Config) -> Self {
        let engine = match DockerEngine::connect() {
            Ok(engine) => Arc::new(engine) as Arc<dyn ContainerEngine>,
            Err(err) => {
                error!(error = %err, "container engine connection failed");
                return Self::disconnected();
            }
        };
        match engine.ping().await {
            Ok(()) => {
                info!("container engine connected");
                Self::with_engine(engine, config)
            }
            Err(err) => {
                error!(error = %err, "container engine unavailable");
                Self::disconnected()
            }
        }
    }

    /// A facade whose engine was unreachable at startup; every operation
    /// reports the same failure envelope.
    pub fn disconnected() -> Self {
        Self { inner: None }
    }

    /// Build the facade over an explicit engine implementation.
    pub fn with_engine(engine: Arc<dyn ContainerEngine>, config: Config) -> Self {
        let workspaces = WorkspaceManager::new(engine.clone(), config.working_root.clone());
        Self {
            inner: Some(SandboxInner {
                registry: EnvironmentRegistry::new(engine.clone(), config.clone()),
                workspaces: workspaces.clone(),
                exec: ExecutionOrchestrator::new(engine.clone()),
                transfer: TransferOrchestrator::new(engine.clone(), workspaces),
                engine,
                config,
            }),
        }
    }

    pub fn available(&self) -> bool {
        self.inner.is_some()
    }

    fn inner(&self) -> Result<&SandboxInner> {
        self.inner.as_ref().ok_or(SandboxError::Unavailable)
    }

    /// Ensure the persistent environment is up, returning its id.
    pub async fn ensure_persistent(&self) -> Result<String> {
        self.inner()?.registry.acquire_persistent().await
    }

    /// Provision an execution environment: the shared persistent one with
    /// a fresh workspace, or a disposable standalone container.
    pub async fn initialize(
        &self,
        image: Option<&str>,
        use_persistent: bool,
    ) -> OpResult<InitializeOutput> {
        respond("initialize", self.initialize_inner(image, use_persistent).await)
    }

    async fn initialize_inner(
        &self,
        image: Option<&str>,
        use_persistent: bool,
    ) -> Result<InitializeOutput> {
        let inner = self.inner()?;
        if use_persistent {
            let container_id = inner.registry.acquire_persistent().await?;
            let workspace = inner.workspaces.create(&container_id).await?;
            Ok(InitializeOutput {
                container_id,
                workspace_id: Some(workspace.id),
                workspace_path: Some(workspace.path),
                mode: EnvironmentMode::Persistent,
            })
        } else {
            let image = image.unwrap_or(&inner.config.sandbox_image);
            let container_id = inner.registry.acquire_standalone(image).await?;
            Ok(InitializeOutput {
                container_id,
                workspace_id: None,
                workspace_path: None,
                mode: EnvironmentMode::Standalone,
            })
        }
    }

    /// Run a command batch; halts at the first failing command.
    pub async fn execute(
        &self,
        container_id: &str,
        commands: &[String],
        workspace_id: Option<&str>,
    ) -> OpResult<ExecuteOutput> {
        respond(
            "execute",
            self.execute_inner(container_id, commands, workspace_id).await,
        )
    }

    async fn execute_inner(
        &self,
        container_id: &str,
        commands: &[String],
        workspace_id: Option<&str>,
    ) -> Result<ExecuteOutput> {
        let inner = self.inner()?;
        let working_dir = inner.workspaces.base_dir(workspace_id);
        let results = inner.exec.run(container_id, commands, &working_dir).await?;
        Ok(ExecuteOutput { results })
    }

    pub async fn write_file(
        &self,
        container_id: &str,
        file_name: &str,
        contents: &str,
        workspace_id: Option<&str>,
        dest_dir: Option<&str>,
    ) -> OpResult<WriteFileOutput> {
        let result = async {
            let inner = self.inner()?;
            let file_path = inner
                .transfer
                .write_text(container_id, file_name, contents, workspace_id, dest_dir)
                .await?;
            Ok(WriteFileOutput { file_path })
        }
        .await;
        respond("write_file", result)
    }

    pub async fn copy_file_in(
        &self,
        container_id: &str,
        local_src: &Path,
        workspace_id: Option<&str>,
        dest_path: Option<&str>,
    ) -> OpResult<CopyFileInOutput> {
        let result = async {
            let inner = self.inner()?;
            let file_path = inner
                .transfer
                .copy_file_in(container_id, local_src, workspace_id, dest_path)
                .await?;
            Ok(CopyFileInOutput { file_path })
        }
        .await;
        respond("copy_file_in", result)
    }

    pub async fn copy_tree_in(
        &self,
        container_id: &str,
        local_dir: &Path,
        workspace_id: Option<&str>,
        dest_dir: Option<&str>,
    ) -> OpResult<CopyTreeInOutput> {
        let result = async {
            let inner = self.inner()?;
            let dest = inner
                .transfer
                .copy_tree_in(container_id, local_dir, workspace_id, dest_dir)
                .await?;
            Ok(CopyTreeInOutput { dest_dir: dest })
        }
        .await;
        respond("copy_tree_in", result)
    }

    pub async fn copy_file_out(
        &self,
        container_id: &str,
        remote_path: &str,
        workspace_id: Option<&str>,
        local_dest: Option<&Path>,
    ) -> OpResult<CopyFileOutOutput> {
        let result = async {
            let inner = self.inner()?;
            let (local_path, file_size) = inner
                .transfer
                .copy_file_out(container_id, remote_path, workspace_id, local_dest)
                .await?;
            Ok(CopyFileOutOutput {
                local_path: local_path.display().to_string(),
                file_size,
            })
        }
        .await;
        respond("copy_file_out", result)
    }

    /// Stop and remove a standalone environment. The persistent
    /// environment is never stopped through this operation: targeting it
    /// reports success and leaves it running.
    pub async fn stop(&self, container_id: &str, is_persistent: bool) -> OpResult<MessageOutput> {
        respond("stop", self.stop_inner(container_id, is_persistent).await)
    }

    async fn stop_inner(&self, container_id: &str, is_persistent: bool) -> Result<MessageOutput> {
        let inner = self.inner()?;
        if is_persistent || inner.registry.is_persistent_id(container_id).await {
            info!(container_id = %container_id, "persistent container left running");
            return Ok(MessageOutput {
                message: format!("container {} is persistent and was left running", container_id),
            });
        }
        inner
            .engine
            .stop(container_id, inner.config.stop_timeout_secs)
            .await?;
        inner.engine.remove(container_id).await?;
        info!(container_id = %container_id, "container stopped and removed");
        Ok(MessageOutput {
            message: format!("container {} stopped and removed", container_id),
        })
    }

    pub async fn clean_workspace(
        &self,
        container_id: &str,
        workspace_id: &str,
    ) -> OpResult<MessageOutput> {
        let result = async {
            let inner = self.inner()?;
            let path = inner.workspaces.clean(container_id, workspace_id).await?;
            Ok(MessageOutput {
                message: format!("workspace {} removed", path),
            })
        }
        .await;
        respond("clean_workspace", result)
    }

    pub async fn fetch_logs(&self, container_id: &str) -> OpResult<LogsOutput> {
        let result = async {
            let inner = self.inner()?;
            let logs = inner.engine.logs(container_id).await?;
            Ok(LogsOutput { logs })
        }
        .await;
        respond("fetch_logs", result)
    }
}

fn respond<T>(operation: &'static str, result: Result<T>) -> OpResult<T> {
    match result {
        Ok(data) => OpResult::ok(data),
        Err(err) => {
            error!(operation, error = %err, "sandbox operation failed");
            OpResult::err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_flattens_payload() {
        let result = OpResult::ok(WriteFileOutput {
            file_path: "/app/a.txt".to_string(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["file_path"], "/app/a.txt");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_envelope_carries_only_the_error() {
        let result: OpResult<WriteFileOutput> = OpResult::err(SandboxError::Unavailable);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "container engine is unavailable");
        assert!(json.get("file_path").is_none());
    }
}

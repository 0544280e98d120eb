//! Container engine capability boundary
//!
//! `ContainerEngine` is the narrow surface the orchestrators need from a
//! container engine: lifecycle, demuxed command execution, and tar-stream
//! archive transfer. `DockerEngine` maps each operation 1:1 onto the
//! Docker API via bollard. No retry policy lives here; a 404 from the
//! daemon becomes `NotFound`, everything else `Engine` with context.

use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{DeviceRequest, HostConfig};
use bollard::Docker;
use futures_util::{StreamExt, TryStreamExt};

/// Parameters for creating a hardened execution environment.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    /// Well-known name; `None` for anonymous standalone environments.
    pub name: Option<String>,
    pub working_dir: String,
    pub mem_limit_bytes: i64,
    pub cpu_quota: i64,
    pub cpu_period: i64,
    /// Request all GPUs through the nvidia runtime.
    pub gpu: bool,
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub running: bool,
}

/// Demuxed output of one command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn inspect(&self, id_or_name: &str) -> Result<ContainerSummary>;
    async fn pull_image(&self, image: &str) -> Result<()>;
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn stop(&self, id: &str, timeout_secs: i64) -> Result<()>;
    /// Removes the container together with its anonymous volumes.
    async fn remove(&self, id: &str) -> Result<()>;
    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        working_dir: Option<String>,
    ) -> Result<ExecOutput>;
    async fn put_archive(&self, id: &str, target_dir: &str, stream: Vec<u8>) -> Result<()>;
    async fn get_archive(&self, id: &str, src_path: &str) -> Result<Vec<u8>>;
    async fn logs(&self, id: &str) -> Result<String>;
}

/// bollard-backed `ContainerEngine` over the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|error| engine_error("connect", error))?;
        Ok(Self { docker })
    }
}

fn engine_error(operation: &'static str, error: bollard::errors::Error) -> SandboxError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => SandboxError::NotFound(message),
        other => SandboxError::Engine {
            operation,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|_| SandboxError::Unavailable)
    }

    async fn inspect(&self, id_or_name: &str) -> Result<ContainerSummary> {
        let response = self
            .docker
            .inspect_container(id_or_name, None)
            .await
            .map_err(|error| engine_error("inspect_container", error))?;
        Ok(ContainerSummary {
            id: response.id.unwrap_or_else(|| id_or_name.to_string()),
            running: response
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
        })
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = match image.rsplit_once(':') {
            Some((name, tag)) => (name, tag),
            None => (image, "latest"),
        };
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: from_image.to_string(),
                    tag: tag.to_string(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map(|_| ())
            .map_err(|error| engine_error("pull_image", error))
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String> {
        let device_requests = spec.gpu.then(|| {
            vec![DeviceRequest {
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });
        let host_config = HostConfig {
            memory: Some(spec.mem_limit_bytes),
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(spec.cpu_period),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            network_mode: Some("none".to_string()),
            runtime: spec.gpu.then(|| "nvidia".to_string()),
            device_requests,
            ..Default::default()
        };
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = spec.name.clone().map(|name| CreateContainerOptions {
            name,
            ..Default::default()
        });
        let created = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|error| engine_error("create_container", error))?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|error| engine_error("start_container", error))?;
        Ok(created.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|error| engine_error("start_container", error))
    }

    async fn stop(&self, id: &str, timeout_secs: i64) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await
            .map_err(|error| engine_error("stop_container", error))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|error| engine_error("remove_container", error))
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        working_dir: Option<String>,
    ) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir,
                    ..Default::default()
                },
            )
            .await
            .map_err(|error| engine_error("create_exec", error))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|error| engine_error("start_exec", error))?
        {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(|error| engine_error("start_exec", error))? {
                    LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|error| engine_error("inspect_exec", error))?;
        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn put_archive(&self, id: &str, target_dir: &str, stream: Vec<u8>) -> Result<()> {
        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: target_dir.to_string(),
                    ..Default::default()
                }),
                stream.into(),
            )
            .await
            .map_err(|error| engine_error("put_archive", error))
    }

    async fn get_archive(&self, id: &str, src_path: &str) -> Result<Vec<u8>> {
        let mut stream = self.docker.download_from_container(
            id,
            Some(DownloadFromContainerOptions {
                path: src_path.to_string(),
            }),
        );
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.map_err(|error| engine_error("get_archive", error))?);
        }
        Ok(bytes)
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let mut stream = self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|error| engine_error("logs", error))? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => bytes.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

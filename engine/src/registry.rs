//! Persistent-environment registry
//!
//! Exactly one persistent environment exists process-wide. Its engine id
//! is cached here and reused until the engine reports it missing. The
//! whole check-cache / lookup-by-name / create-if-absent sequence runs
//! under one mutex so concurrent callers never race to create duplicates;
//! the guard is released before any execute or transfer work begins.

use crate::config::Config;
use crate::docker::{ContainerEngine, ContainerSpec};
use crate::error::{Result, SandboxError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    Persistent,
    Standalone,
}

pub struct EnvironmentRegistry {
    engine: Arc<dyn ContainerEngine>,
    config: Config,
    persistent_id: Mutex<Option<String>>,
}

impl EnvironmentRegistry {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: Config) -> Self {
        Self {
            engine,
            config,
            persistent_id: Mutex::new(None),
        }
    }

    /// Return a running persistent environment, creating it if absent.
    pub async fn acquire_persistent(&self) -> Result<String> {
        let mut cached = self.persistent_id.lock().await;

        if let Some(id) = cached.as_deref() {
            match self.engine.inspect(id).await {
                Ok(summary) if summary.running => return Ok(summary.id),
                Ok(_) => {}
                Err(SandboxError::NotFound(_)) => {
                    warn!(container_id = %id, "persistent container vanished; recreating");
                    *cached = None;
                }
                Err(error) => return Err(error),
            }
        }

        // The container may predate this process; look it up by name.
        match self.engine.inspect(&self.config.persistent_name).await {
            Ok(summary) => {
                if !summary.running {
                    self.engine.start(&summary.id).await?;
                }
                info!(container_id = %summary.id, "reusing existing persistent container");
                *cached = Some(summary.id.clone());
                return Ok(summary.id);
            }
            Err(SandboxError::NotFound(_)) => {}
            Err(error) => return Err(error),
        }

        info!(image = %self.config.sandbox_image, "pulling image for persistent container");
        self.engine.pull_image(&self.config.sandbox_image).await?;
        let id = self.engine.create_and_start(&self.persistent_spec()).await?;
        self.engine
            .exec(
                &id,
                vec![
                    "mkdir".to_string(),
                    "-p".to_string(),
                    self.config.workspaces_root(),
                ],
                None,
            )
            .await?;
        info!(container_id = %id, "created persistent container");
        *cached = Some(id.clone());
        Ok(id)
    }

    /// Create a fresh standalone environment; the caller owns its lifecycle.
    pub async fn acquire_standalone(&self, image: &str) -> Result<String> {
        info!(image = %image, "pulling image for standalone container");
        self.engine.pull_image(image).await?;
        let id = self
            .engine
            .create_and_start(&self.standalone_spec(image))
            .await?;
        info!(container_id = %id, "created standalone container");
        Ok(id)
    }

    /// Whether this id is the cached persistent environment.
    pub async fn is_persistent_id(&self, id: &str) -> bool {
        self.persistent_id.lock().await.as_deref() == Some(id)
    }

    fn persistent_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.config.sandbox_image.clone(),
            name: Some(self.config.persistent_name.clone()),
            working_dir: self.config.working_root.clone(),
            mem_limit_bytes: self.config.mem_limit_bytes,
            cpu_quota: self.config.cpu_quota,
            cpu_period: self.config.cpu_period,
            gpu: self.config.gpu(),
        }
    }

    fn standalone_spec(&self, image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            name: None,
            working_dir: self.config.working_root.clone(),
            mem_limit_bytes: self.config.mem_limit_bytes,
            cpu_quota: self.config.cpu_quota,
            cpu_period: self.config.cpu_period,
            gpu: false,
        }
    }
}

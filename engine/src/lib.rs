//! Remote code-execution sandbox built on a local container engine.
//!
//! The crate is organized around a small set of collaborators: a
//! [`ContainerEngine`] adapter over the Docker API, an
//! [`EnvironmentRegistry`] that owns the single persistent container, a
//! [`WorkspaceManager`] for per-session directories inside it, and the
//! execute/transfer orchestrators. The [`Sandbox`] facade ties them
//! together and converts every failure into a structured result envelope
//! at the operation boundary.

pub mod config;
pub mod docker;
pub mod error;
pub mod exec;
pub mod mock;
pub mod ops;
pub mod registry;
pub mod transfer;
pub mod workspace;

pub use config::Config;
pub use docker::{ContainerEngine, ContainerSpec, ContainerSummary, DockerEngine, ExecOutput};
pub use error::{Result, SandboxError};
pub use exec::CommandResult;
pub use mock::MockEngine;
pub use ops::{OpResult, Sandbox};
pub use registry::{EnvironmentMode, EnvironmentRegistry};
pub use workspace::{Workspace, WorkspaceManager};

//! Error taxonomy for sandbox operations
//!
//! `Unavailable` is a permanent condition established once at startup;
//! everything else is surfaced per call. Non-zero command exits are not
//! errors at all: they are recorded as data in the execution batch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("container engine is unavailable")]
    Unavailable,

    /// The referenced container, or a path inside it, no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied local path is missing; no engine call is made.
    #[error("local path does not exist: {}", .0.display())]
    LocalNotFound(PathBuf),

    /// Destination paths may not climb out of their scoped root.
    #[error("destination path `{0}` contains a parent-directory component")]
    InvalidPath(String),

    #[error(transparent)]
    Archive(#[from] tarball::ArchiveError),

    #[error("container engine failure during {operation}: {message}")]
    Engine {
        operation: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, SandboxError>;

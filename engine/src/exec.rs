//! Ordered command-batch execution with halt-on-failure semantics
//!
//! Commands run through `sh -c` so pipes and redirects work; the working
//! directory is an explicit exec parameter, never spliced into the
//! command string. Bootstrap and dependency installs are best-effort:
//! their failures are logged and never surface in the batch results.

use crate::docker::ContainerEngine;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One record per executed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

pub struct ExecutionOrchestrator {
    engine: Arc<dyn ContainerEngine>,
}

impl ExecutionOrchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Run commands in order against `working_dir`, stopping at the first
    /// non-zero exit. The returned batch covers exactly what ran, up to
    /// and including a failing command.
    pub async fn run(
        &self,
        container_id: &str,
        commands: &[String],
        working_dir: &str,
    ) -> Result<Vec<CommandResult>> {
        self.bootstrap(container_id).await;

        let mut results = Vec::new();
        for command in commands {
            if is_python_invocation(command) {
                self.install_requirements(container_id, working_dir).await;
            }

            debug!(container_id = %container_id, command = %command, "executing command");
            let output = self
                .engine
                .exec(container_id, shell(command), Some(working_dir.to_string()))
                .await?;

            let success = output.exit_code == 0;
            results.push(CommandResult {
                command: command.clone(),
                exit_code: output.exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                success,
            });

            if !success {
                warn!(
                    container_id = %container_id,
                    command = %command,
                    exit_code = output.exit_code,
                    "command failed; halting batch"
                );
                break;
            }
        }
        Ok(results)
    }

    /// Make sure a package manager exists before the first command runs.
    /// Best-effort: a sandbox without network or apt still executes the
    /// batch, it just cannot install packages.
    async fn bootstrap(&self, container_id: &str) {
        let probe = vec!["which".to_string(), "pip".to_string()];
        match self.engine.exec(container_id, probe, None).await {
            Ok(output) if output.exit_code == 0 && !output.stdout.is_empty() => return,
            Ok(_) => {}
            Err(error) => {
                warn!(container_id = %container_id, %error, "pip probe failed");
                return;
            }
        }

        info!(container_id = %container_id, "pip not found, attempting install");
        for cmd in [
            vec!["apt-get".to_string(), "update".to_string()],
            vec![
                "apt-get".to_string(),
                "install".to_string(),
                "-y".to_string(),
                "python3-pip".to_string(),
            ],
        ] {
            match self.engine.exec(container_id, cmd, None).await {
                Ok(output) if output.exit_code == 0 => {}
                Ok(output) => {
                    warn!(
                        container_id = %container_id,
                        exit_code = output.exit_code,
                        "pip install step failed; continuing without it"
                    );
                    return;
                }
                Err(error) => {
                    warn!(container_id = %container_id, %error, "pip install step failed");
                    return;
                }
            }
        }
    }

    /// Best-effort dependency install ahead of a python invocation.
    async fn install_requirements(&self, container_id: &str, working_dir: &str) {
        for cmd in [
            vec![
                "pip".to_string(),
                "install".to_string(),
                "--upgrade".to_string(),
                "pip".to_string(),
            ],
            vec![
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
                "requirements.txt".to_string(),
            ],
        ] {
            match self
                .engine
                .exec(container_id, cmd, Some(working_dir.to_string()))
                .await
            {
                Ok(output) if output.exit_code == 0 => {}
                Ok(output) => {
                    warn!(
                        container_id = %container_id,
                        exit_code = output.exit_code,
                        "dependency install failed; running command anyway"
                    );
                    return;
                }
                Err(error) => {
                    warn!(container_id = %container_id, %error, "dependency install failed");
                    return;
                }
            }
        }
    }
}

fn shell(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

fn is_python_invocation(command: &str) -> bool {
    command.trim_start().starts_with("python")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_invocations_are_detected() {
        assert!(is_python_invocation("python main.py"));
        assert!(is_python_invocation("  python3 -m http.server"));
        assert!(!is_python_invocation("echo python"));
    }

    #[test]
    fn shell_wraps_without_string_splicing() {
        assert_eq!(shell("a | b > c"), vec!["sh", "-c", "a | b > c"]);
    }
}

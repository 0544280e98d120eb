//! Configuration for the sandbox engine service

use clap::Parser;
use std::env;

pub const DEFAULT_IMAGE: &str = "python:3.9-slim";
pub const PERSISTENT_CONTAINER_NAME: &str = "code_sandbox_persistent";

const DEFAULT_WORKING_ROOT: &str = "/app";
const DEFAULT_MEM_LIMIT_BYTES: i64 = 256 * 1024 * 1024;
const DEFAULT_CPU_QUOTA: i64 = 100_000;
const DEFAULT_CPU_PERIOD: i64 = 100_000;
const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;
const DEFAULT_PORT: u16 = 9520;

/// Configuration for the sandbox engine
#[derive(Debug, Clone, Parser)]
#[command(name = "sandboxd")]
#[command(about = "Container-backed code execution sandbox service")]
pub struct Config {
    /// Default image for execution environments
    #[arg(long, env, default_value = DEFAULT_IMAGE)]
    pub sandbox_image: String,

    /// Well-known name of the persistent container
    #[arg(long, env, default_value = PERSISTENT_CONTAINER_NAME)]
    pub persistent_name: String,

    /// Working root inside every environment
    #[arg(long, env, default_value = DEFAULT_WORKING_ROOT)]
    pub working_root: String,

    /// Memory ceiling per environment, in bytes
    #[arg(long, env, default_value_t = DEFAULT_MEM_LIMIT_BYTES)]
    pub mem_limit_bytes: i64,

    /// CFS quota per environment
    #[arg(long, env, default_value_t = DEFAULT_CPU_QUOTA)]
    pub cpu_quota: i64,

    /// CFS period per environment
    #[arg(long, env, default_value_t = DEFAULT_CPU_PERIOD)]
    pub cpu_period: i64,

    /// Grace period before a stop escalates to a kill
    #[arg(long, env, default_value_t = DEFAULT_STOP_TIMEOUT_SECS)]
    pub stop_timeout_secs: i64,

    /// Skip the GPU device request for the persistent environment
    #[arg(long, env)]
    pub no_gpu: bool,

    /// Do not pre-start the persistent environment at boot
    #[arg(long, env)]
    pub no_persistent: bool,

    /// Health endpoint port
    #[arg(long, env, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox_image: env::var("SANDBOX_IMAGE").unwrap_or_else(|_| DEFAULT_IMAGE.to_string()),
            persistent_name: env::var("PERSISTENT_NAME")
                .unwrap_or_else(|_| PERSISTENT_CONTAINER_NAME.to_string()),
            working_root: env::var("WORKING_ROOT")
                .unwrap_or_else(|_| DEFAULT_WORKING_ROOT.to_string()),
            mem_limit_bytes: env::var("MEM_LIMIT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MEM_LIMIT_BYTES),
            cpu_quota: env::var("CPU_QUOTA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CPU_QUOTA),
            cpu_period: env::var("CPU_PERIOD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CPU_PERIOD),
            stop_timeout_secs: env::var("STOP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
            no_gpu: env::var("NO_GPU")
                .map(|v| v.parse().unwrap_or(false))
                .unwrap_or(false),
            no_persistent: env::var("NO_PERSISTENT")
                .map(|v| v.parse().unwrap_or(false))
                .unwrap_or(false),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
        }
    }
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Directory under the working root that holds per-caller workspaces
    pub fn workspaces_root(&self) -> String {
        format!("{}/workspaces", self.working_root.trim_end_matches('/'))
    }

    /// Whether the persistent environment requests GPU device access
    pub fn gpu(&self) -> bool {
        !self.no_gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspaces_root_joins_under_working_root() {
        let config = Config {
            working_root: "/app".to_string(),
            ..Config::default()
        };
        assert_eq!(config.workspaces_root(), "/app/workspaces");
    }

    #[test]
    fn workspaces_root_tolerates_trailing_slash() {
        let config = Config {
            working_root: "/srv/sandbox/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.workspaces_root(), "/srv/sandbox/workspaces");
    }

    #[test]
    fn gpu_is_requested_unless_disabled() {
        let mut config = Config::default();
        config.no_gpu = false;
        assert!(config.gpu());
        config.no_gpu = true;
        assert!(!config.gpu());
    }
}

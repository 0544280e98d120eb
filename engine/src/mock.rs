//! In-memory `ContainerEngine` for tests
//!
//! Models just enough of a container engine to exercise the registry and
//! orchestrators without a Docker daemon: containers with running state,
//! a flat path -> bytes filesystem per container, argv interpretation for
//! the handful of commands the orchestrators issue, and tar-stream
//! archive transfer backed by the same codec the real adapter feeds.

use crate::docker::{ContainerEngine, ContainerSpec, ContainerSummary, ExecOutput};
use crate::error::{Result, SandboxError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MockContainer {
    name: Option<String>,
    running: bool,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    logs: String,
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    next_id: u64,
    calls: usize,
    exec_history: Vec<(String, Vec<String>)>,
}

pub struct MockEngine {
    state: Mutex<MockState>,
    available: bool,
    pip_missing: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            available: true,
            pip_missing: false,
        }
    }

    /// An engine whose daemon never answers the startup probe.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// An engine whose containers lack pip and reject package installs,
    /// for exercising best-effort bootstrap paths.
    pub fn without_pip() -> Self {
        Self {
            pip_missing: true,
            ..Self::new()
        }
    }

    /// Total adapter calls issued, across every operation.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Every exec issued, in order, as (container id, argv).
    pub fn exec_history(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().exec_history.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn is_running(&self, id: &str) -> Option<bool> {
        let state = self.state.lock().unwrap();
        state.containers.get(id).map(|c| c.running)
    }

    pub fn file_bytes(&self, id: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.containers.get(id)?.files.get(path).cloned()
    }

    pub fn has_dir(&self, id: &str, path: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id)
            .map(|c| c.dirs.contains(path))
            .unwrap_or(false)
    }

    pub fn set_logs(&self, id: &str, logs: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(id) {
            container.logs = logs.to_string();
        }
    }

    /// Seed a named container, as if left behind by an earlier process.
    pub fn seed_container(&self, name: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("mock-{:04}", state.next_id);
        state.next_id += 1;
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: Some(name.to_string()),
                running,
                ..Default::default()
            },
        );
        id
    }

    /// Drop a container behind the registry's back.
    pub fn forget_container(&self, id: &str) {
        self.state.lock().unwrap().containers.remove(id);
    }

    fn resolve<'a>(state: &'a MockState, id_or_name: &str) -> Option<(String, &'a MockContainer)> {
        if let Some(container) = state.containers.get(id_or_name) {
            return Some((id_or_name.to_string(), container));
        }
        state
            .containers
            .iter()
            .find(|(_, c)| c.name.as_deref() == Some(id_or_name))
            .map(|(id, c)| (id.clone(), c))
    }

    fn resolve_id(state: &MockState, id_or_name: &str) -> Result<String> {
        Self::resolve(state, id_or_name)
            .map(|(id, _)| id)
            .ok_or_else(|| SandboxError::NotFound(id_or_name.to_string()))
    }
}

fn mkdirs(container: &mut MockContainer, path: &str) {
    let mut prefix = String::new();
    for part in path.trim_matches('/').split('/') {
        prefix.push('/');
        prefix.push_str(part);
        container.dirs.insert(prefix.clone());
    }
}

fn remove_tree(container: &mut MockContainer, path: &str) {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    container.dirs.remove(path);
    container.dirs.retain(|d| !d.starts_with(&prefix));
    container.files.retain(|f, _| f != path && !f.starts_with(&prefix));
}

fn ok(exit_code: i64) -> ExecOutput {
    ExecOutput {
        exit_code,
        ..Default::default()
    }
}

fn with_stdout(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.as_bytes().to_vec(),
        ..Default::default()
    }
}

fn with_stderr(exit_code: i64, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stderr: stderr.as_bytes().to_vec(),
        ..Default::default()
    }
}

impl MockEngine {
    fn interpret_script(&self, container: &mut MockContainer, script: &str) -> ExecOutput {
        let script = script.trim();
        if script == "true" {
            ok(0)
        } else if script == "false" {
            ok(1)
        } else if let Some(rest) = script.strip_prefix("echo ") {
            with_stdout(&format!("{}\n", rest))
        } else if let Some(rest) = script.strip_prefix("exit ") {
            ok(rest.parse().unwrap_or(1))
        } else if let Some(rest) = script.strip_prefix("mkdir -p ") {
            mkdirs(container, rest);
            ok(0)
        } else if let Some(rest) = script.strip_prefix("cat ") {
            match container.files.get(rest) {
                Some(bytes) => with_stdout(&String::from_utf8_lossy(bytes)),
                None => with_stderr(1, &format!("cat: {}: No such file or directory\n", rest)),
            }
        } else {
            ok(0)
        }
    }

    fn interpret(&self, container: &mut MockContainer, cmd: &[String]) -> ExecOutput {
        let argv: Vec<&str> = cmd.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["mkdir", "-p", path] => {
                mkdirs(container, path);
                ok(0)
            }
            ["rm", "-rf", path] => {
                remove_tree(container, path);
                ok(0)
            }
            ["which", "pip"] => {
                if self.pip_missing {
                    ok(1)
                } else {
                    with_stdout("/usr/local/bin/pip\n")
                }
            }
            ["apt-get", ..] => with_stderr(100, "apt-get: Permission denied\n"),
            ["pip", ..] => {
                if self.pip_missing {
                    with_stderr(127, "sh: pip: not found\n")
                } else {
                    ok(0)
                }
            }
            ["sh", "-c", script] => self.interpret_script(container, script),
            _ => ok(0),
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<()> {
        self.state.lock().unwrap().calls += 1;
        if self.available {
            Ok(())
        } else {
            Err(SandboxError::Unavailable)
        }
    }

    async fn inspect(&self, id_or_name: &str) -> Result<ContainerSummary> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Self::resolve(&state, id_or_name)
            .map(|(id, container)| ContainerSummary {
                id,
                running: container.running,
            })
            .ok_or_else(|| SandboxError::NotFound(id_or_name.to_string()))
    }

    async fn pull_image(&self, _image: &str) -> Result<()> {
        self.state.lock().unwrap().calls += 1;
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = format!("mock-{:04}", state.next_id);
        state.next_id += 1;
        let mut container = MockContainer {
            name: spec.name.clone(),
            running: true,
            ..Default::default()
        };
        mkdirs(&mut container, &spec.working_dir);
        state.containers.insert(id.clone(), container);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        state.containers.get_mut(&id).unwrap().running = true;
        Ok(())
    }

    async fn stop(&self, id: &str, _timeout_secs: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        state.containers.get_mut(&id).unwrap().running = false;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        state.containers.remove(&id);
        Ok(())
    }

    async fn exec(
        &self,
        id: &str,
        cmd: Vec<String>,
        _working_dir: Option<String>,
    ) -> Result<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        state.exec_history.push((id.clone(), cmd.clone()));
        let container = state.containers.get_mut(&id).unwrap();
        let output = self.interpret(container, &cmd);
        Ok(output)
    }

    async fn put_archive(&self, id: &str, target_dir: &str, stream: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        let container = state.containers.get_mut(&id).unwrap();
        mkdirs(container, target_dir);
        for entry in tarball::entries(&stream)? {
            let path = format!("{}/{}", target_dir.trim_end_matches('/'), entry.name);
            if let Some((parent, _)) = path.rsplit_once('/') {
                if !parent.is_empty() {
                    mkdirs(container, parent);
                }
            }
            container.files.insert(path, entry.data);
        }
        Ok(())
    }

    async fn get_archive(&self, id: &str, src_path: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        let container = state.containers.get(&id).unwrap();
        match container.files.get(src_path) {
            Some(bytes) => {
                let name = src_path.rsplit('/').next().unwrap_or(src_path);
                Ok(tarball::from_bytes(name, bytes)?)
            }
            None => Err(SandboxError::NotFound(src_path.to_string())),
        }
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let id = Self::resolve_id(&state, id)?;
        Ok(state.containers.get(&id).unwrap().logs.clone())
    }
}

//! Command-batch semantics through the operation boundary.

use sandbox_engine::{Config, ContainerEngine, MockEngine, Sandbox};
use std::sync::Arc;

fn sandbox(engine: Arc<MockEngine>) -> Sandbox {
    Sandbox::with_engine(engine as Arc<dyn ContainerEngine>, Config::default())
}

fn commands(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

async fn persistent_env(sandbox: &Sandbox) -> (String, String) {
    let init = sandbox.initialize(None, true).await;
    let data = init.unwrap_data();
    (
        data.container_id.clone(),
        data.workspace_id.clone().unwrap(),
    )
}

#[tokio::test]
async fn batch_halts_at_the_first_failing_command() {
    let engine = Arc::new(MockEngine::new());
    let sandbox = sandbox(engine.clone());
    let (container, workspace) = persistent_env(&sandbox).await;

    let result = sandbox
        .execute(
            &container,
            &commands(&["true", "false", "echo after"]),
            Some(&workspace),
        )
        .await;

    let results = &result.unwrap_data().results;
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_ne!(results[1].exit_code, 0);

    // The command after the failure was never dispatched.
    let dispatched: Vec<_> = engine
        .exec_history()
        .into_iter()
        .filter(|(_, argv)| argv.contains(&"echo after".to_string()))
        .collect();
    assert!(dispatched.is_empty());
}

#[tokio::test]
async fn batch_records_stdout_per_command() {
    let engine = Arc::new(MockEngine::new());
    let sandbox = sandbox(engine);
    let (container, workspace) = persistent_env(&sandbox).await;

    let result = sandbox
        .execute(&container, &commands(&["echo hello"]), Some(&workspace))
        .await;

    let results = &result.unwrap_data().results;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].command, "echo hello");
    assert_eq!(results[0].stdout, "hello\n");
    assert_eq!(results[0].exit_code, 0);
}

#[tokio::test]
async fn bootstrap_failures_never_surface_in_the_batch() {
    let engine = Arc::new(MockEngine::without_pip());
    let sandbox = sandbox(engine.clone());
    let (container, workspace) = persistent_env(&sandbox).await;

    // pip is missing and apt-get is denied, so both the bootstrap and the
    // pre-python dependency install fail; the batch itself must not.
    let result = sandbox
        .execute(
            &container,
            &commands(&["python main.py"]),
            Some(&workspace),
        )
        .await;

    let results = &result.unwrap_data().results;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].command, "python main.py");
    assert!(results[0].success);
}

#[tokio::test]
async fn python_commands_get_a_dependency_install_attempt() {
    let engine = Arc::new(MockEngine::new());
    let sandbox = sandbox(engine.clone());
    let (container, workspace) = persistent_env(&sandbox).await;

    sandbox
        .execute(
            &container,
            &commands(&["python main.py"]),
            Some(&workspace),
        )
        .await;

    let pip_calls: Vec<_> = engine
        .exec_history()
        .into_iter()
        .filter(|(_, argv)| argv.first().map(String::as_str) == Some("pip"))
        .collect();
    assert!(!pip_calls.is_empty());
}

#[tokio::test]
async fn non_python_commands_skip_dependency_installs() {
    let engine = Arc::new(MockEngine::new());
    let sandbox = sandbox(engine.clone());
    let (container, workspace) = persistent_env(&sandbox).await;

    sandbox
        .execute(&container, &commands(&["echo python"]), Some(&workspace))
        .await;

    let pip_calls: Vec<_> = engine
        .exec_history()
        .into_iter()
        .filter(|(_, argv)| argv.first().map(String::as_str) == Some("pip"))
        .collect();
    assert!(pip_calls.is_empty());
}

#[tokio::test]
async fn executing_against_an_unknown_container_reports_failure() {
    let engine = Arc::new(MockEngine::new());
    let sandbox = sandbox(engine);

    let result = sandbox
        .execute("missing", &commands(&["true"]), None)
        .await;

    assert!(!result.is_success());
    assert!(result.error().unwrap().contains("missing"));
}

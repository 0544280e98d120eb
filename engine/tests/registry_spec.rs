//! Persistent-environment registry behavior against the in-memory engine.

use futures_util::future::join_all;
use sandbox_engine::config::PERSISTENT_CONTAINER_NAME;
use sandbox_engine::{Config, ContainerEngine, EnvironmentRegistry, MockEngine};
use std::sync::Arc;

fn registry(engine: Arc<MockEngine>) -> EnvironmentRegistry {
    EnvironmentRegistry::new(engine as Arc<dyn ContainerEngine>, Config::default())
}

#[tokio::test]
async fn persistent_container_is_created_once_and_reused() {
    let engine = Arc::new(MockEngine::new());
    let registry = registry(engine.clone());

    let first = registry.acquire_persistent().await.unwrap();
    let second = registry.acquire_persistent().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.container_count(), 1);
    assert_eq!(engine.is_running(&first), Some(true));
    // The workspaces root is provisioned as part of creation.
    assert!(engine.has_dir(&first, "/app/workspaces"));
}

#[tokio::test]
async fn concurrent_acquires_never_create_duplicates() {
    let engine = Arc::new(MockEngine::new());
    let registry = Arc::new(registry(engine.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire_persistent().await.unwrap() })
        })
        .collect();
    let ids: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|handle| handle.unwrap())
        .collect();

    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(engine.container_count(), 1);
}

#[tokio::test]
async fn vanished_persistent_container_is_recreated() {
    let engine = Arc::new(MockEngine::new());
    let registry = registry(engine.clone());

    let first = registry.acquire_persistent().await.unwrap();
    engine.forget_container(&first);

    let second = registry.acquire_persistent().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(engine.container_count(), 1);
    assert_eq!(engine.is_running(&second), Some(true));
}

#[tokio::test]
async fn stopped_container_from_an_earlier_process_is_restarted() {
    let engine = Arc::new(MockEngine::new());
    let seeded = engine.seed_container(PERSISTENT_CONTAINER_NAME, false);
    let registry = registry(engine.clone());

    let acquired = registry.acquire_persistent().await.unwrap();

    assert_eq!(acquired, seeded);
    assert_eq!(engine.container_count(), 1);
    assert_eq!(engine.is_running(&seeded), Some(true));
    assert!(registry.is_persistent_id(&seeded).await);
}

#[tokio::test]
async fn standalone_containers_are_fresh_and_unnamed() {
    let engine = Arc::new(MockEngine::new());
    let registry = registry(engine.clone());

    let first = registry.acquire_standalone("alpine:3.19").await.unwrap();
    let second = registry.acquire_standalone("alpine:3.19").await.unwrap();

    assert_ne!(first, second);
    assert_eq!(engine.container_count(), 2);
    assert!(!registry.is_persistent_id(&first).await);
}

//! Integration tests for the session registry.
//!
//! These tests verify that:
//! - A local id is created once and then only resolved
//! - Concurrent first contact for one id collapses to one remote conversation
//! - Failed or timed-out creation leaves no mapping behind

use scholar_core::mock::MockKnowledgeService;
use scholar_core::{ConversationStore, Deadline, Error};
use scholar_session::{SessionRegistry, SqliteConversationStore};
use std::sync::Arc;
use std::time::Duration;

async fn registry_with(
    service: Arc<MockKnowledgeService>,
) -> (tempfile::TempDir, Arc<SqliteConversationStore>, SessionRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteConversationStore::open(&dir.path().join("threads.db"))
            .await
            .unwrap(),
    );
    let registry = SessionRegistry::new(store.clone(), service);
    (dir, store, registry)
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

#[tokio::test]
async fn test_ensure_twice_creates_once() {
    let service = Arc::new(MockKnowledgeService::new());
    let (_dir, _store, registry) = registry_with(service.clone()).await;

    assert!(registry.ensure_conversation("C01:1700.1", deadline()).await.unwrap());
    let first = registry.resolve("C01:1700.1").await.unwrap();

    assert!(!registry.ensure_conversation("C01:1700.1", deadline()).await.unwrap());
    let second = registry.resolve("C01:1700.1").await.unwrap();

    assert_eq!(first, Some("thread_1".to_string()));
    assert_eq!(first, second);
    assert_eq!(service.created_conversations(), 1);
}

#[tokio::test]
async fn test_resolve_and_contains_never_call_remote() {
    let service = Arc::new(MockKnowledgeService::new());
    let (_dir, _store, registry) = registry_with(service.clone()).await;

    assert_eq!(registry.resolve("unknown").await.unwrap(), None);
    assert!(!registry.contains("unknown").await.unwrap());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_distinct_ids_get_distinct_conversations() {
    let service = Arc::new(MockKnowledgeService::new());
    let (_dir, store, registry) = registry_with(service.clone()).await;

    registry.ensure_conversation("a", deadline()).await.unwrap();
    registry.ensure_conversation("b", deadline()).await.unwrap();

    let a = registry.resolve("a").await.unwrap().unwrap();
    let b = registry.resolve("b").await.unwrap().unwrap();
    assert_ne!(a, b);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_contact_creates_one_conversation() {
    const CALLERS: usize = 8;

    let service = Arc::new(
        MockKnowledgeService::new().with_create_delay(Duration::from_millis(50)),
    );
    let (_dir, _store, registry) = registry_with(service.clone()).await;
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let created = registry
                    .ensure_conversation("C01:1700.1", deadline())
                    .await
                    .unwrap();
                let remote = registry.resolve("C01:1700.1").await.unwrap().unwrap();
                (created, remote)
            })
        })
        .collect();

    let mut created_count = 0;
    let mut remotes = Vec::new();
    for handle in handles {
        let (created, remote) = handle.await.unwrap();
        created_count += usize::from(created);
        remotes.push(remote);
    }

    assert_eq!(service.created_conversations(), 1);
    assert_eq!(created_count, 1);
    assert_eq!(remotes.len(), CALLERS);
    assert!(remotes.iter().all(|r| r == "thread_1"));
}

#[tokio::test]
async fn test_failed_create_persists_nothing() {
    let service = Arc::new(MockKnowledgeService::new().failing_create());
    let (_dir, store, registry) = registry_with(service).await;

    let err = registry
        .ensure_conversation("C01:1700.1", deadline())
        .await
        .unwrap_err();

    match err {
        Error::RemoteCreate { local_id, .. } => assert_eq!(local_id, "C01:1700.1"),
        other => panic!("Expected RemoteCreate, got {other:?}"),
    }
    assert!(!registry.contains("C01:1700.1").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_timeout_persists_nothing() {
    let service = Arc::new(
        MockKnowledgeService::new().with_create_delay(Duration::from_secs(30)),
    );
    let (_dir, store, registry) = registry_with(service).await;

    let err = registry
        .ensure_conversation("slow", Deadline::after(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("create_conversation"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_mapping_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.db");
    let service = Arc::new(MockKnowledgeService::new());

    {
        let store = Arc::new(SqliteConversationStore::open(&path).await.unwrap());
        let registry = SessionRegistry::new(store, service.clone());
        registry.ensure_conversation("global", deadline()).await.unwrap();
    }

    let store = Arc::new(SqliteConversationStore::open(&path).await.unwrap());
    let registry = SessionRegistry::new(store, service.clone());

    assert!(!registry.ensure_conversation("global", deadline()).await.unwrap());
    assert_eq!(
        registry.resolve("global").await.unwrap().as_deref(),
        Some("thread_1")
    );
    assert_eq!(service.created_conversations(), 1);
}

//! Remote Backend Tests
//!
//! Runs the HTTP service on a local port and drives it through
//! `RemoteBackend`, so both sides of the wire format are exercised together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edu_cache::{
    api::create_router,
    backend::{cache_key, fetch_through, CacheBackend, MemoryBackend, RemoteBackend},
    cache::{ManualClock, TtlCache},
    AppState, InvalidationRules,
};
use serde_json::json;
use tokio::net::TcpListener;

struct TestServer {
    remote: RemoteBackend,
    clock: ManualClock,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(max_entries: usize) -> TestServer {
    let clock = ManualClock::new(0);
    let cache = TtlCache::with_clock(max_entries, Duration::from_secs(60), clock.clone());
    let state = AppState::new(Arc::new(MemoryBackend::from_cache(cache)));
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = RemoteBackend::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    TestServer {
        remote,
        clock,
        handle,
    }
}

#[tokio::test]
async fn test_remote_miss_then_hit() {
    let server = start_server(10).await;
    let remote = &server.remote;

    assert_eq!(remote.get("student_profile_7").await.unwrap(), None);

    remote
        .set("student_profile_7", json!({"name": "Bia", "xp": 340}), None)
        .await
        .unwrap();
    assert_eq!(
        remote.get("student_profile_7").await.unwrap(),
        Some(json!({"name": "Bia", "xp": 340}))
    );
}

#[tokio::test]
async fn test_remote_null_is_not_a_miss() {
    let server = start_server(10).await;

    server.remote.set("ranking:3", json!(null), None).await.unwrap();
    assert_eq!(server.remote.get("ranking:3").await.unwrap(), Some(json!(null)));
}

#[tokio::test]
async fn test_remote_keys_are_percent_encoded() {
    let server = start_server(10).await;
    let key = "class activities:42?week=3#top";

    server.remote.set(key, json!([1, 2]), None).await.unwrap();
    assert_eq!(server.remote.get(key).await.unwrap(), Some(json!([1, 2])));
    assert!(server.remote.delete(key).await.unwrap());
}

#[tokio::test]
async fn test_remote_ttl_expiry() {
    let server = start_server(10).await;

    server
        .remote
        .set("k", json!("v"), Some(Duration::from_secs(1)))
        .await
        .unwrap();

    server.clock.advance(Duration::from_millis(500));
    assert!(server.remote.get("k").await.unwrap().is_some());

    server.clock.advance(Duration::from_millis(1_000));
    assert!(server.remote.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remote_eviction_pattern_delete_clear() {
    let server = start_server(2).await;
    let remote = &server.remote;

    remote.set("a", json!(1), None).await.unwrap();
    remote.set("b", json!(2), None).await.unwrap();
    remote.set("c", json!(3), None).await.unwrap();
    assert_eq!(remote.get("a").await.unwrap(), None);
    assert_eq!(remote.size().await.unwrap(), 2);

    remote.clear().await.unwrap();
    remote.set("user:1", json!(1), None).await.unwrap();
    remote.set("order:1", json!(2), None).await.unwrap();
    assert_eq!(remote.delete_pattern("user:*").await.unwrap(), 1);
    assert_eq!(remote.size().await.unwrap(), 1);

    assert!(!remote.delete("user:1").await.unwrap());

    let stats = remote.stats().await.unwrap();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.total_entries, 1);
}

#[tokio::test]
async fn test_remote_errors_surface() {
    let server = start_server(10).await;

    let err = server.remote.set("", json!(1), None).await.unwrap_err();
    assert!(err.to_string().contains("Key cannot be empty"));
}

#[tokio::test]
async fn test_remote_health() {
    let server = start_server(10).await;

    let health = server.remote.health().await;
    assert!(health.is_healthy());
    assert_eq!(server.remote.mode(), "remote");
}

#[tokio::test]
async fn test_fetch_through_remote() {
    let server = start_server(10).await;
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let key = cache_key("user:classes", ["7", "student"]);

    for _ in 0..2 {
        let classes: Result<Vec<String>, std::io::Error> =
            fetch_through(&server.remote, &key, Some(Duration::from_secs(600)), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["Math 7A".to_string(), "History 7A".to_string()])
            })
            .await;
        assert_eq!(classes.unwrap().len(), 2);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rules_invalidate_through_remote() {
    let server = start_server(10).await;
    server.remote.set("meetings:list", json!([]), None).await.unwrap();
    server.remote.set("meeting:5", json!({}), None).await.unwrap();
    server.remote.set("classes:list", json!([]), None).await.unwrap();

    let rules = InvalidationRules::with_defaults();
    let (_, removed) = rules
        .invalidate(&server.remote, "meeting:update", &HashMap::new())
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(server.remote.size().await.unwrap(), 1);
}

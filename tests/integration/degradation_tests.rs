//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 共享层降级与恢复测试

#[path = "../common/mod.rs"]
mod common;

use common::memory_service;
use markcache::metrics::{HEALTH_CONNECTED, HEALTH_DEGRADED};
use markcache::recovery::health::HealthState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_returns_sentinels() {
    let (service, backend) = memory_service();
    backend.set_unreachable(true);
    let cache = service.cache();
    let key = service.keyspace().user_profile("u1").unwrap();

    assert_eq!(cache.get::<String>(&key).await, None);
    assert!(!cache.put(&key, &"alice", 600).await);
    assert_eq!(cache.remove(&[&key]).await, 0);
    assert_eq!(cache.incr_counter("bm:views:u1", 60).await, 0);
    assert!(!cache.shared().available().await);
    assert!(matches!(
        cache.shared().state().await,
        HealthState::Degraded { .. }
    ));
    assert_eq!(service.metrics().health(), HEALTH_DEGRADED);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_set_stays_correct_while_degraded() {
    let (service, backend) = memory_service();
    backend.set_unreachable(true);
    let cache = service.cache();
    let key = service.keyspace().folder_tree("u1").unwrap();
    let calls = AtomicUsize::new(0);

    for round in 0..3 {
        let value: Result<Vec<String>, std::io::Error> = cache
            .get_or_set(&key, 300, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["inbox".to_string()])
            })
            .await;
        assert_eq!(value.unwrap(), vec!["inbox".to_string()], "round {}", round);
        // 本地层窗口过后重新回源
        tokio::time::advance(Duration::from_secs(4)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_throttled_then_recovers() {
    let (service, backend) = memory_service();
    backend.set_unreachable(true);
    let cache = service.cache();
    let key = service.keyspace().user_prefs("u1").unwrap();

    for _ in 0..50 {
        let _: Option<String> = cache.get(&key).await;
        cache.put(&key, &"dark", 600).await;
    }
    // 冷却窗口内只尝试过一次连接，之后的操作都没有访问后端
    assert_eq!(backend.calls("connect"), 1);
    assert_eq!(backend.calls("get"), 0);
    assert_eq!(backend.calls("set"), 0);

    backend.set_unreachable(false);
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!cache.put(&key, &"dark", 600).await);
    assert_eq!(backend.calls("connect"), 1);

    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(cache.put(&key, &"dark", 600).await);
    assert_eq!(backend.calls("connect"), 2);
    assert!(cache.shared().state().await.is_connected());
    assert_eq!(service.metrics().health(), HEALTH_CONNECTED);
    assert_eq!(backend.raw(&key), Some(b"\"dark\"".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_mid_session_failure_degrades() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().tag_list("u1").unwrap();

    assert!(cache.put(&key, &["rust"], 300).await);
    backend.set_unreachable(true);

    // 本地层仍然命中，不会触发共享层访问
    assert_eq!(cache.get::<Vec<String>>(&key).await, Some(vec!["rust".to_string()]));
    assert!(cache.shared().state().await.is_connected());

    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(cache.get::<Vec<String>>(&key).await, None);
    match cache.shared().state().await {
        HealthState::Degraded {
            failure_count,
            last_error,
            ..
        } => {
            assert_eq!(failure_count, 1);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("Expected Degraded state, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_does_not_stall_callers() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    assert!(cache.shared().available().await);
    backend.set_latency(Duration::from_secs(30));

    let started = tokio::time::Instant::now();
    let key = service.keyspace().user_stats("u1").unwrap();
    let _: Option<u32> = cache.get(&key).await;
    // 命令超时 500ms
    assert!(started.elapsed() < Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    for _ in 0..10 {
        let _: Option<u32> = cache.get(&key).await;
    }
    assert!(started.elapsed() < Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_stampede_protection_survives_degradation() {
    let (service, backend) = memory_service();
    backend.set_unreachable(true);
    let cache = service.cache();
    let key = service
        .keyspace()
        .render(&markcache::keyspace::DASH_OVERVIEW, "u1", &[])
        .unwrap();
    let calls = AtomicUsize::new(0);

    let requests = (0..5).map(|_| {
        cache.get_or_set_locked(&key, 120, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(42u32)
        })
    });
    let results = futures::future::join_all(requests).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.into_iter().all(|r| matches!(r, Ok(Some(42)))));
}

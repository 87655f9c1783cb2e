//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 双层缓存门面集成测试

#[path = "../common/mod.rs"]
mod common;

use common::memory_service;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FolderTree {
    id: u64,
    children: Vec<String>,
}

fn tree() -> FolderTree {
    FolderTree {
        id: 1,
        children: vec!["inbox".to_string(), "reading".to_string()],
    }
}

#[tokio::test]
async fn test_put_then_get() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().folder_tree("u1").unwrap();

    assert!(cache.put(&key, &tree(), 300).await);
    assert_eq!(cache.get::<FolderTree>(&key).await, Some(tree()));

    // 两层都已写入
    assert!(cache.local().get(&key).is_some());
    assert!(backend.raw(&key).is_some());
}

#[tokio::test]
async fn test_drop_removes_from_both_tiers() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().tag_list("u1").unwrap();

    cache.put(&key, &vec!["rust", "cache"], 300).await;
    assert_eq!(cache.remove(&[&key]).await, 1);
    assert_eq!(cache.get::<Vec<String>>(&key).await, None);
    assert!(backend.raw(&key).is_none());

    // 未知键是空操作
    assert_eq!(cache.remove(&["bm:tags:nobody:list"]).await, 0);
}

#[tokio::test]
async fn test_get_or_set_calls_factory_once_while_cached() {
    let (service, _backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().user_stats("u1").unwrap();
    let calls = AtomicUsize::new(0);

    for _ in 0..5 {
        let value: Result<u64, std::io::Error> = cache
            .get_or_set(&key, 300, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(17)
            })
            .await;
        assert_eq!(value.unwrap(), 17);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_factory_error_propagates_and_is_not_cached() {
    #[derive(Debug, PartialEq)]
    struct QueryFailed;

    let (service, _backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().dashboard_stats("u1").unwrap();

    let first: Result<u64, QueryFailed> =
        cache.get_or_set(&key, 120, || async { Err(QueryFailed) }).await;
    assert_eq!(first, Err(QueryFailed));
    assert!(!cache.contains(&key).await);

    let second: Result<u64, QueryFailed> = cache.get_or_set(&key, 120, || async { Ok(3) }).await;
    assert_eq!(second, Ok(3));
}

#[tokio::test(start_paused = true)]
async fn test_local_expiry_falls_back_to_shared() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().user_prefs("u1").unwrap();

    cache.put(&key, &"dark", 600).await;
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(cache.local().get(&key).is_none());

    let gets = backend.calls("get");
    assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("dark"));
    assert_eq!(backend.calls("get"), gets + 1);
    // 已回填本地层
    assert!(cache.local().get(&key).is_some());
}

#[tokio::test]
async fn test_local_overflow_evicts_quarter() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let keys: Vec<String> = (0..201)
        .map(|i| service.keyspace().link_detail("u1", &i.to_string()).unwrap())
        .collect();

    for key in &keys {
        cache.put(key, &1u8, 300).await;
    }

    let local_hits = keys.iter().filter(|k| cache.local().get(k).is_some()).count();
    assert!(local_hits <= 150, "only {} of 201 evicted", 201 - local_hits);
    assert_eq!(backend.len(), 201);

    // 被淘汰的键仍然能从共享层读到
    let evicted = keys
        .iter()
        .find(|k| cache.local().get(k).is_none())
        .expect("some key was evicted");
    assert_eq!(cache.get::<u8>(evicted).await, Some(1));
}

#[tokio::test]
async fn test_corrupt_shared_payload_is_a_miss() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let key = service.keyspace().tag_counts("u1").unwrap();
    backend.insert_raw(&key, b"\x80\x03}q\x00legacy", None);

    assert_eq!(cache.get::<Vec<u32>>(&key).await, None);
    assert!(backend.raw(&key).is_none());
    assert_eq!(service.metrics().count("shared", "decode", "corrupt"), 1);

    // 读穿会重新计算并写回
    let value: Result<Vec<u32>, std::io::Error> =
        cache.get_or_set(&key, 300, || async { Ok(vec![4, 2]) }).await;
    assert_eq!(value.unwrap(), vec![4, 2]);
    assert_eq!(backend.raw(&key), Some(b"[4,2]".to_vec()));
}

#[tokio::test]
async fn test_remove_family_only_touches_prefix() {
    let (service, backend) = memory_service();
    let cache = service.cache();
    let ks = service.keyspace();

    for cursor in ["0", "1", "2"] {
        let key = ks.link_list("u1", "all", "newest", cursor).unwrap();
        cache.put(&key, &[1, 2], 120).await;
    }
    let other = ks.link_list("u10", "all", "newest", "0").unwrap();
    cache.put(&other, &[3], 120).await;

    let prefix = ks.family_prefix(&markcache::keyspace::LINK_LIST, "u1").unwrap();
    assert_eq!(cache.remove_family(&prefix).await, 3);
    assert_eq!(backend.len(), 1);
    assert!(cache.contains(&other).await);
}

#[tokio::test(start_paused = true)]
async fn test_counter_expires_with_ttl() {
    let (service, _backend) = memory_service();
    let cache = service.cache();

    assert_eq!(cache.incr_counter("bm:views:u1", 60).await, 1);
    assert_eq!(cache.incr_counter("bm:views:u1", 60).await, 2);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.incr_counter("bm:views:u1", 60).await, 1);
}

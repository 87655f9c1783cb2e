//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 真实 Redis 上的端到端测试，Redis 不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use common::{is_redis_available, redis_url, setup_logging, unique_owner};
use markcache::backend::l2::RedisBackend;
use markcache::backend::SharedBackend;
use markcache::config::SharedConfig;
use markcache::{CacheService, Config};
use std::collections::BTreeMap;

fn redis_config() -> Config {
    let mut config = Config::default();
    config.namespace = "markcache-test".to_string();
    config.shared.connection_string = redis_url().into();
    config.shared.connection_timeout_ms = 5000;
    config.shared.command_timeout_ms = 2000;
    config
}

#[tokio::test]
async fn test_round_trip_through_redis() {
    setup_logging();
    if !is_redis_available().await {
        println!("Skipping test_round_trip_through_redis because Redis is not available");
        return;
    }

    let service = CacheService::connect(redis_config())
        .await
        .expect("Failed to create cache service");
    assert!(service.cache().shared().state().await.is_connected());

    let owner = unique_owner("rt");
    let key = service.keyspace().folder_tree(&owner).unwrap();
    let mut tree = BTreeMap::new();
    tree.insert("inbox".to_string(), 12u32);
    tree.insert("reading".to_string(), 3u32);

    assert!(service.cache().put(&key, &tree, 300).await);
    service.cache().local().clear();
    assert_eq!(
        service.cache().get::<BTreeMap<String, u32>>(&key).await,
        Some(tree)
    );

    assert_eq!(service.cache().remove(&[&key]).await, 1);
    assert!(!service.cache().contains(&key).await);
}

#[tokio::test]
async fn test_counter_and_family_delete() {
    setup_logging();
    if !is_redis_available().await {
        println!("Skipping test_counter_and_family_delete because Redis is not available");
        return;
    }

    let service = CacheService::connect(redis_config())
        .await
        .expect("Failed to create cache service");
    let owner = unique_owner("fam");
    let ks = service.keyspace();

    let counter = format!("{}:views:{}", ks.namespace(), owner);
    assert_eq!(service.cache().incr_counter(&counter, 60).await, 1);
    assert_eq!(service.cache().incr_counter(&counter, 60).await, 2);

    for cursor in 0..25 {
        let key = ks.link_list(&owner, "all", "newest", &cursor.to_string()).unwrap();
        service.cache().put(&key, &[cursor], 120).await;
    }
    let removed = service.router().on_bulk_change(&owner).await.unwrap();
    assert!(removed >= 25, "removed only {}", removed);

    let probe = ks.link_list(&owner, "all", "newest", "7").unwrap();
    service.cache().local().clear();
    assert!(!service.cache().contains(&probe).await);
    service.cache().remove(&[&counter]).await;
}

#[tokio::test]
async fn test_backend_reports_errors_instead_of_absorbing() {
    setup_logging();
    let config = SharedConfig {
        connection_string: "redis://127.0.0.1:1".to_string().into(),
        connection_timeout_ms: 500,
        ..Default::default()
    };
    let backend = RedisBackend::new(&config).expect("valid url");
    assert!(backend.connect().await.is_err());
    assert!(backend.ping().await.is_err());
}

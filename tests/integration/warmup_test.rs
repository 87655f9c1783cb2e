//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 缓存预热集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{memory_service, memory_service_with, CountingLoader};
use markcache::keyspace::{FOLDER_TREE, TAG_LIST};
use markcache::sync::warmup::{CANARY, WARM_SET};
use markcache::{Config, SkipReason, WarmupDispatch, WarmupReport};
use std::time::Duration;

async fn finish(dispatch: WarmupDispatch) -> WarmupReport {
    match dispatch {
        WarmupDispatch::Started(handle) => handle.await.expect("warmup task panicked"),
        WarmupDispatch::Skipped(reason) => panic!("warmup skipped: {:?}", reason),
    }
}

fn skipped(dispatch: &WarmupDispatch) -> Option<SkipReason> {
    match dispatch {
        WarmupDispatch::Skipped(reason) => Some(*reason),
        WarmupDispatch::Started(_) => None,
    }
}

#[tokio::test]
async fn test_second_warmup_does_no_work() {
    let (service, _backend) = memory_service();
    let loader = CountingLoader::new();
    let agent = service.warmup_agent(loader.clone());

    let first = agent.warmup("u1").await;
    let second = agent.warmup("u1").await;
    assert!(first.is_started());
    assert_eq!(skipped(&second), Some(SkipReason::InFlight));

    let report = finish(first).await;
    assert_eq!(report.loaded, WARM_SET.len() + 1);
    assert!(report.success());
    assert_eq!(loader.calls(), WARM_SET.len() + 1);

    let third = agent.warmup("u1").await;
    assert_eq!(skipped(&third), Some(SkipReason::AlreadyWarm));
    assert_eq!(loader.calls(), WARM_SET.len() + 1);
}

#[tokio::test]
async fn test_agents_share_in_flight_owners() {
    let (service, _backend) = memory_service();
    let loader = CountingLoader::new();
    let first_agent = service.warmup_agent(loader.clone());
    let second_agent = service.warmup_agent(loader.clone());

    let first = first_agent.warmup("u1").await;
    let second = second_agent.warmup("u1").await;
    assert!(first.is_started());
    assert_eq!(skipped(&second), Some(SkipReason::InFlight));

    finish(first).await;
    assert_eq!(loader.calls(), WARM_SET.len() + 1);
    assert_eq!(
        skipped(&second_agent.warmup("u1").await),
        Some(SkipReason::AlreadyWarm)
    );
}

#[tokio::test]
async fn test_malformed_owner_is_skipped() {
    let (service, backend) = memory_service();
    let loader = CountingLoader::new();
    let agent = service.warmup_agent(loader.clone());

    assert_eq!(
        skipped(&agent.warmup("u1:x").await),
        Some(SkipReason::InvalidOwner)
    );
    assert_eq!(loader.calls(), 0);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_warmup_populates_common_keys() {
    let (service, backend) = memory_service();
    let agent = service.warmup_agent(CountingLoader::new());

    finish(agent.warmup("u1").await).await;

    let ks = service.keyspace();
    for template in WARM_SET.iter().chain(std::iter::once(&CANARY)) {
        let key = ks.render(template, "u1", &[]).unwrap();
        let value: Option<serde_json::Value> = service.cache().get(&key).await;
        assert_eq!(
            value.and_then(|v| v.get("view").cloned()),
            Some(serde_json::json!(template.name))
        );
        assert!(backend.raw(&key).is_some());
    }
    // 其他所有者不受影响
    assert!(!service.cache().contains(&ks.dashboard_home("u2").unwrap()).await);
}

#[tokio::test]
async fn test_failed_load_skips_canary_and_allows_retry() {
    let (service, _backend) = memory_service();
    let loader = CountingLoader::new();
    loader.fail_on(&TAG_LIST);
    let agent = service.warmup_agent(loader.clone());

    let report = finish(agent.warmup("u1").await).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.loaded, WARM_SET.len() - 1);
    let dashboard_home = service.keyspace().dashboard_home("u1").unwrap();
    assert!(!service.cache().contains(&dashboard_home).await);

    // 金丝雀未写入，下一次触发会重新预热
    let retry = agent.warmup("u1").await;
    assert!(retry.is_started());
    finish(retry).await;
}

#[tokio::test]
async fn test_empty_views_still_mark_warm() {
    let (service, _backend) = memory_service();
    let loader = CountingLoader::new();
    loader.empty_on(&FOLDER_TREE);
    let agent = service.warmup_agent(loader);

    let report = finish(agent.warmup("u1").await).await;
    assert_eq!(report.empty, 1);
    assert_eq!(report.failed, 0);
    let folder_tree = service.keyspace().folder_tree("u1").unwrap();
    assert!(!service.cache().contains(&folder_tree).await);
    let dashboard_home = service.keyspace().dashboard_home("u1").unwrap();
    assert!(service.cache().contains(&dashboard_home).await);
}

#[tokio::test]
async fn test_disabled_warmup_is_skipped() {
    let mut config = Config::default();
    config.warmup.enabled = false;
    let (service, _backend) = memory_service_with(config);
    let loader = CountingLoader::new();
    let agent = service.warmup_agent(loader.clone());

    assert_eq!(
        skipped(&agent.warmup("u1").await),
        Some(SkipReason::Disabled)
    );
    assert_eq!(loader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_loader_times_out() {
    let (service, _backend) = memory_service();
    let loader = CountingLoader::new();
    loader.set_delay(Duration::from_secs(120));
    let agent = service.warmup_agent(loader);

    let report = finish(agent.warmup("u1").await).await;
    assert!(report.timed_out);
    assert!(!report.success());
    let dashboard_home = service.keyspace().dashboard_home("u1").unwrap();
    assert!(!service.cache().contains(&dashboard_home).await);

    // 超时后不再视为进行中
    assert!(agent.warmup("u1").await.is_started());
}

#[tokio::test(start_paused = true)]
async fn test_warmup_never_fails_with_shared_tier_down() {
    let (service, backend) = memory_service();
    backend.set_unreachable(true);
    let agent = service.warmup_agent(CountingLoader::new());

    let report = finish(agent.warmup("u1").await).await;
    assert!(report.success());
    // 写入了本地层
    assert!(service
        .cache()
        .local()
        .get(&service.keyspace().dashboard_home("u1").unwrap())
        .is_some());
}

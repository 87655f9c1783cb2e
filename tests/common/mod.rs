//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use markcache::backend::memory::MemoryBackend;
use markcache::keyspace::KeyTemplate;
use markcache::{CacheService, Config, WarmupLoader};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn setup_logging() {
    markcache::telemetry::init_logging("debug");
}

/// 基于内存后端创建缓存服务
pub fn memory_service() -> (CacheService, Arc<MemoryBackend>) {
    memory_service_with(Config::default())
}

pub fn memory_service_with(config: Config) -> (CacheService, Arc<MemoryBackend>) {
    setup_logging();
    let backend = Arc::new(MemoryBackend::new());
    let service =
        CacheService::with_backend(config, backend.clone()).expect("valid test config");
    (service, backend)
}

/// 获取测试用的 Redis 地址
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
pub async fn is_redis_available() -> bool {
    let client = match redis::Client::open(redis_url()) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let connect = tokio::time::timeout(
        Duration::from_secs(2),
        client.get_multiplexed_async_connection(),
    );
    match connect.await {
        Ok(Ok(mut conn)) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok(),
        _ => false,
    }
}

/// 生成唯一的所有者ID，避免测试之间在共享存储上互相干扰
pub fn unique_owner(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// 记录调用次数的预热加载器
#[derive(Default)]
pub struct CountingLoader {
    calls: AtomicUsize,
    failing: Mutex<HashSet<&'static str>>,
    empty: Mutex<HashSet<&'static str>>,
    delay: Mutex<Duration>,
}

impl CountingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 让某个模板的加载失败
    pub fn fail_on(&self, template: &KeyTemplate) {
        self.failing.lock().unwrap().insert(template.name);
    }

    /// 让某个模板返回"无数据"
    pub fn empty_on(&self, template: &KeyTemplate) {
        self.empty.lock().unwrap().insert(template.name);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl WarmupLoader for CountingLoader {
    async fn load(&self, owner: &str, template: &KeyTemplate) -> anyhow::Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(template.name) {
            anyhow::bail!("source query for {} failed", template.name);
        }
        if self.empty.lock().unwrap().contains(template.name) {
            return Ok(None);
        }
        Ok(Some(json!({ "owner": owner, "view": template.name })))
    }
}

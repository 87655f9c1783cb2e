//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了双层缓存门面，结合本地层（L1）和共享层（L2）。

use super::l2::SharedTier;
use crate::backend::l1::LocalTier;
use crate::backend::SharedBackend;
use crate::config::Config;
use crate::metrics::CacheMetrics;
use crate::serialization::{JsonSerializer, Serializer};
use crate::sync::single_flight::StampedeLocks;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 双层缓存门面
///
/// 读路径先查本地层，未命中再查共享层并回填本地层；写路径同时写入两层。
/// 共享层的任何故障都在 `SharedTier` 内部吸收，这里只会看到"无数据"。
/// 只有调用方提供的计算函数的错误会穿过缓存边界。
pub struct CacheFacade {
    local: LocalTier,
    shared: SharedTier,
    locks: StampedeLocks,
    wait: Duration,
    serializer: JsonSerializer,
    metrics: Arc<CacheMetrics>,
}

impl CacheFacade {
    /// 创建新的缓存门面
    ///
    /// # 参数
    ///
    /// * `config` - 缓存配置
    /// * `backend` - 共享层的远端存储
    /// * `metrics` - 指标收集器
    pub fn new(
        config: &Config,
        backend: Arc<dyn SharedBackend>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            local: LocalTier::new(config.local.capacity, config.local.ttl()),
            shared: SharedTier::new(backend, &config.shared, metrics.clone()),
            locks: StampedeLocks::new(config.stampede.lock_ttl()),
            wait: config.stampede.wait(),
            serializer: JsonSerializer::new(),
            metrics,
        }
    }

    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    pub fn shared(&self) -> &SharedTier {
        &self.shared
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// 获取缓存值
    ///
    /// 本地层命中直接返回；共享层命中时回填本地层
    #[instrument(skip(self), level = "debug")]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(bytes) = self.local.get(key) {
            match self.serializer.deserialize(&bytes) {
                Ok(value) => {
                    self.metrics.record_request("local", "get", "hit");
                    return Some(value);
                }
                Err(e) => {
                    warn!("L1 entry for key {} failed to decode, discarding: {}", key, e);
                    self.local.remove(key);
                }
            }
        }
        self.metrics.record_request("local", "get", "miss");

        let bytes = self.shared.get_bytes(key).await?;
        let value = self.shared.decode(key, &bytes).await?;
        debug!("L2 hit, backfilling L1: key={}", key);
        self.local.set(key, bytes);
        Some(value)
    }

    /// 写入缓存值
    ///
    /// 本地层使用固定短TTL，共享层使用调用方给出的领域TTL。
    /// 返回共享层是否写入成功
    #[instrument(skip(self, value), level = "debug")]
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: u64) -> bool {
        match self.serializer.serialize(value) {
            Ok(bytes) => self.put_encoded(key, bytes, ttl).await,
            Err(e) => {
                warn!("put: failed to encode key {}: {}", key, e);
                false
            }
        }
    }

    async fn put_encoded(&self, key: &str, bytes: Vec<u8>, ttl: u64) -> bool {
        self.local.set(key, bytes.clone());
        self.shared.put_bytes(key, bytes, ttl).await
    }

    /// 缓存计算结果，`null` 结果不缓存
    async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: u64) {
        match self.serializer.serialize(value) {
            Ok(bytes) if self.serializer.is_null(&bytes) => {
                debug!("factory returned null, not caching: key={}", key);
            }
            Ok(bytes) => {
                self.put_encoded(key, bytes, ttl).await;
            }
            Err(e) => warn!("failed to encode factory result for key {}: {}", key, e),
        }
    }

    /// 从两层中删除若干键，不存在的键忽略
    ///
    /// 先删共享层再删本地层，避免并发读在删除期间用旧值回填本地层。
    /// 返回共享层实际删除的数量
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    pub async fn remove<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let removed = self.shared.delete(&keys).await;
        for key in &keys {
            self.local.remove(key);
        }
        removed
    }

    /// 删除以 `prefix` 开头的所有键（一个键族）
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_family(&self, prefix: &str) -> u64 {
        let shared = self.shared.delete_prefix(prefix).await;
        let local = self.local.remove_prefix(prefix);
        debug!(
            "remove_family: prefix={}, local={}, shared={}",
            prefix, local, shared
        );
        shared
    }

    /// 读穿：命中直接返回，否则调用 `factory` 计算并缓存非空结果
    ///
    /// `factory` 的错误原样返回，且不会被缓存
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: u64, factory: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }
        let value = factory().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    /// 带防击穿保护的读穿，用于计算代价高的聚合
    ///
    /// 同一进程内同一个键同时最多只有一个计算在进行。拿不到锁的调用方等待一个
    /// 固定间隔后返回此时的缓存内容，可能仍然是 `None`，这不是错误。
    /// 锁在计算成功、失败或 future 被取消时都会释放。
    #[instrument(skip(self, factory), level = "debug")]
    pub async fn get_or_set_locked<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: u64,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let guard = match self.locks.try_acquire(key) {
            Some(guard) => guard,
            None => {
                self.metrics.record_request("stampede", "lock", "wait");
                tokio::time::sleep(self.wait).await;
                return Ok(self.get(key).await);
            }
        };
        self.metrics.record_request("stampede", "lock", "acquired");

        // 上一个持有者可能刚写完并释放了锁
        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let value = factory().await?;
        self.store(key, &value, ttl).await;
        drop(guard);
        Ok(Some(value))
    }

    /// 共享层原子计数，第一次自增时设置TTL
    ///
    /// 共享层降级时返回 0
    #[instrument(skip(self), level = "debug")]
    pub async fn incr_counter(&self, key: &str, ttl: u64) -> i64 {
        let value = self.shared.increment(key).await;
        if value == 1 {
            self.shared.expire(key, ttl).await;
        }
        value
    }

    /// 键是否存在于任意一层
    pub async fn contains(&self, key: &str) -> bool {
        self.local.get(key).is_some() || self.shared.exists(key).await
    }
}

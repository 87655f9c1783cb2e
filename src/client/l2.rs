//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享层（L2）客户端：在远端存储之上叠加健康状态机和降级语义。

use crate::backend::{prefix_pattern, SharedBackend};
use crate::config::SharedConfig;
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::recovery::health::{HealthState, HealthTracker};
use crate::serialization::{JsonSerializer, Serializer};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{timeout, Instant};
use tracing::{info, instrument, warn};

/// 共享层客户端
///
/// 任何操作失败（错误或超时）都会把状态切到 `Degraded`，之后每个操作直接返回
/// 其"空操作"值（不存在 / false / 0），直到冷却窗口过去后的下一次重连成功。
/// 缓存永远不会因为共享层故障而向调用方报错。
pub struct SharedTier {
    backend: Arc<dyn SharedBackend>,
    health: RwLock<HealthTracker>,
    serializer: JsonSerializer,
    metrics: Arc<CacheMetrics>,
    connection_timeout: Duration,
    command_timeout: Duration,
}

impl SharedTier {
    /// 创建新的共享层客户端，初始状态为 `Disconnected`
    ///
    /// # 参数
    ///
    /// * `backend` - 远端存储
    /// * `config` - 共享层配置（超时与重连冷却）
    /// * `metrics` - 指标收集器
    pub fn new(
        backend: Arc<dyn SharedBackend>,
        config: &SharedConfig,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            backend,
            health: RwLock::new(HealthTracker::new(config.reconnect_cooldown())),
            serializer: JsonSerializer::new(),
            metrics,
            connection_timeout: config.connection_timeout(),
            command_timeout: config.command_timeout(),
        }
    }

    /// 获取当前健康状态
    pub async fn state(&self) -> HealthState {
        self.health.read().await.state().clone()
    }

    /// 共享层当前是否可用
    ///
    /// 未连接时会（在冷却允许的情况下）尝试连接
    pub async fn available(&self) -> bool {
        self.ensure_connected().await
    }

    /// 尝试连接，冷却窗口内不会重复尝试
    ///
    /// 另一个任务正在重连时直接返回 false，不在这里等待
    async fn ensure_connected(&self) -> bool {
        match self.health.try_read() {
            Ok(tracker) if tracker.state().is_connected() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }

        let mut tracker = match self.health.try_write() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if tracker.state().is_connected() {
            return true;
        }
        let now = Instant::now();
        if !tracker.should_attempt(now) {
            return false;
        }
        tracker.begin_attempt(now);

        match timeout(self.connection_timeout, self.backend.connect()).await {
            Ok(Ok(())) => {
                info!("Shared tier connected");
                tracker.on_connected(Instant::now());
                self.metrics.set_health(tracker.state().status_code());
                self.metrics.record_request("shared", "connect", "success");
                true
            }
            Ok(Err(e)) => {
                warn!("Shared tier connect failed: {}", e);
                tracker.on_failure(Instant::now(), e.to_string());
                self.metrics.set_health(tracker.state().status_code());
                self.metrics.record_request("shared", "connect", "error");
                false
            }
            Err(_) => {
                warn!(
                    "Shared tier connect timed out after {}ms",
                    self.connection_timeout.as_millis()
                );
                tracker.on_failure(
                    Instant::now(),
                    format!(
                        "connect timed out after {}ms",
                        self.connection_timeout.as_millis()
                    ),
                );
                self.metrics.set_health(tracker.state().status_code());
                self.metrics.record_request("shared", "connect", "error");
                false
            }
        }
    }

    /// 处理共享层故障
    async fn handle_failure(&self, op: &'static str, error: CacheError) {
        warn!("Shared tier {} failed, degrading: {}", op, error);
        self.metrics.record_request("shared", op, "error");
        let mut tracker = self.health.write().await;
        tracker.on_failure(Instant::now(), error.to_string());
        self.metrics.set_health(tracker.state().status_code());
    }

    /// 在健康检查和命令超时的保护下执行一次后端操作
    ///
    /// 不可用、出错或超时都返回 `fallback`
    async fn guarded<T, F, Fut>(&self, op: &'static str, fallback: T, f: F) -> T
    where
        F: FnOnce(Arc<dyn SharedBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.ensure_connected().await {
            self.metrics.record_request("shared", op, "skipped");
            return fallback;
        }
        match timeout(self.command_timeout, f(self.backend.clone())).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                self.handle_failure(op, e).await;
                fallback
            }
            Err(_) => {
                let e = CacheError::Timeout(format!(
                    "{} timed out after {}ms",
                    op,
                    self.command_timeout.as_millis()
                ));
                self.handle_failure(op, e).await;
                fallback
            }
        }
    }

    /// 获取原始载荷
    #[instrument(skip(self), level = "debug")]
    pub async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let k = key.to_string();
        let value = self
            .guarded("get", None, |b| async move { b.get(&k).await })
            .await;
        let result = if value.is_some() { "hit" } else { "miss" };
        self.metrics.record_request("shared", "get", result);
        value
    }

    /// 获取并解码缓存值
    ///
    /// 载荷损坏时视为未命中，并主动删除该键
    #[instrument(skip(self), level = "debug")]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get_bytes(key).await?;
        self.decode(key, &bytes).await
    }

    /// 解码从共享层读到的载荷
    ///
    /// 失败时删除该键，避免同一个坏载荷反复导致未命中
    pub async fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Option<T> {
        match self.serializer.deserialize(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                let corrupt = CacheError::CorruptPayload {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}; deleting key", corrupt);
                self.metrics.record_request("shared", "decode", "corrupt");
                self.delete(&[key.to_string()]).await;
                None
            }
        }
    }

    /// 写入原始载荷
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: u64) -> bool {
        let k = key.to_string();
        let stored = self
            .guarded("put", false, |b| async move {
                b.set_ex(&k, value, ttl).await.map(|_| true)
            })
            .await;
        if stored {
            self.metrics.record_request("shared", "put", "success");
        }
        stored
    }

    /// 编码并写入缓存值
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: u64) -> bool {
        match self.serializer.serialize(value) {
            Ok(bytes) => self.put_bytes(key, bytes, ttl).await,
            Err(e) => {
                warn!("Shared tier put: failed to encode key {}: {}", key, e);
                false
            }
        }
    }

    /// 删除若干键，返回实际删除数量
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    pub async fn delete(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let keys = keys.to_vec();
        self.guarded("delete", 0, |b| async move { b.delete(&keys).await })
            .await
    }

    /// 删除所有以 `prefix` 开头的键
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_prefix(&self, prefix: &str) -> u64 {
        let pattern = prefix_pattern(prefix);
        self.guarded("delete_prefix", 0, |b| async move {
            b.delete_matching(&pattern).await
        })
        .await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn exists(&self, key: &str) -> bool {
        let k = key.to_string();
        self.guarded("exists", false, |b| async move { b.exists(&k).await })
            .await
    }

    /// 原子自增，降级时返回 0
    #[instrument(skip(self), level = "debug")]
    pub async fn increment(&self, key: &str) -> i64 {
        let k = key.to_string();
        self.guarded("incr", 0, |b| async move { b.incr(&k).await })
            .await
    }

    /// 设置过期时间（秒）
    #[instrument(skip(self), level = "debug")]
    pub async fn expire(&self, key: &str, ttl: u64) -> bool {
        let k = key.to_string();
        self.guarded("expire", false, |b| async move { b.expire(&k, ttl).await })
            .await
    }

    /// 存活探测
    ///
    /// 探测失败同样会让共享层进入降级状态
    pub async fn ping(&self) -> bool {
        self.guarded("ping", false, |b| async move { b.ping().await.map(|_| true) })
            .await
    }
}

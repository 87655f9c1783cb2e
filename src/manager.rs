//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存服务，负责按配置装配键空间、双层缓存、失效路由和预热代理。

use crate::backend::{l2::RedisBackend, SharedBackend};
use crate::client::two_level::CacheFacade;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::keyspace::KeySpace;
use crate::metrics::CacheMetrics;
use crate::sync::invalidation::InvalidationRouter;
use crate::sync::warmup::{InFlightOwners, WarmupAgent, WarmupLoader};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 缓存服务
///
/// 本地层、锁表和共享层健康状态都归这个实例所有，由应用的组合根显式创建。
/// 同一进程中可以存在多个互不干扰的实例（测试中常见）。
pub struct CacheService {
    config: Config,
    keyspace: KeySpace,
    metrics: Arc<CacheMetrics>,
    cache: Arc<CacheFacade>,
    router: InvalidationRouter,
    warmups: InFlightOwners,
}

impl CacheService {
    /// 基于 Redis 创建缓存服务，并尝试建立首次连接
    ///
    /// 首次连接失败不是错误：共享层进入降级状态，冷却后自动重试
    #[instrument(skip(config), level = "info", fields(namespace = %config.namespace))]
    pub async fn connect(config: Config) -> Result<Self> {
        let backend = Arc::new(RedisBackend::new(&config.shared)?);
        let service = Self::with_backend(config, backend)?;
        if service.cache.shared().available().await {
            info!("CacheService ready with shared tier connected");
        } else {
            warn!(
                "CacheService started with shared tier unavailable, serving from local tier only"
            );
        }
        Ok(service)
    }

    /// 基于任意共享层后端创建缓存服务，不做网络 I/O
    ///
    /// # 参数
    ///
    /// * `config` - 缓存配置，创建前会被验证
    /// * `backend` - 共享层后端
    pub fn with_backend(config: Config, backend: Arc<dyn SharedBackend>) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let keyspace = KeySpace::new(config.namespace.clone());
        let metrics = Arc::new(CacheMetrics::new());
        let cache = Arc::new(CacheFacade::new(&config, backend, metrics.clone()));
        let router = InvalidationRouter::new(keyspace.clone(), cache.clone());

        Ok(Self {
            config,
            keyspace,
            metrics,
            cache,
            router,
            warmups: Arc::new(DashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<CacheFacade> {
        &self.cache
    }

    pub fn router(&self) -> &InvalidationRouter {
        &self.router
    }

    /// 创建使用给定加载器的预热代理
    ///
    /// 同一服务创建的所有代理共享正在预热的所有者集合，并发预热按所有者去重
    pub fn warmup_agent(&self, loader: Arc<dyn WarmupLoader>) -> WarmupAgent {
        WarmupAgent::new(
            self.keyspace.clone(),
            self.cache.clone(),
            loader,
            self.config.warmup.clone(),
            self.warmups.clone(),
        )
    }
}

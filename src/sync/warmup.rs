//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存预热：在请求路径之外为某个用户预先填充常用键。

use crate::client::two_level::CacheFacade;
use crate::config::WarmupConfig;
use crate::keyspace::{
    KeySpace, KeyTemplate, DASH_HOME, DASH_QUICK, DASH_STATS, FOLDER_TREE, TAG_COUNTS, TAG_LIST,
    USER_PREFS,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// 预热时填充的键（金丝雀键除外）
pub const WARM_SET: &[KeyTemplate] = &[
    DASH_STATS,
    DASH_QUICK,
    FOLDER_TREE,
    TAG_LIST,
    TAG_COUNTS,
    USER_PREFS,
];

/// 金丝雀键：存在即视为已预热，且总是最后写入
pub const CANARY: KeyTemplate = DASH_HOME;

/// 预热数据加载器
///
/// 由业务层实现，从数据源计算某个所有者某个视图的值
#[async_trait]
pub trait WarmupLoader: Send + Sync {
    /// 返回 `Ok(None)` 表示该视图当前没有数据
    async fn load(&self, owner: &str, template: &KeyTemplate) -> anyhow::Result<Option<Value>>;
}

/// 跳过预热的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// 所有者ID不是合法键段
    InvalidOwner,
    /// 本进程中该所有者的预热仍在进行
    InFlight,
    /// 金丝雀键已存在
    AlreadyWarm,
}

/// 预热结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub loaded: usize,
    pub empty: usize,
    pub failed: usize,
    pub timed_out: bool,
}

impl WarmupReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && !self.timed_out
    }

    fn tally(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Loaded => self.loaded += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// 预热派发结果
#[derive(Debug)]
pub enum WarmupDispatch {
    /// 已派发到独立任务，句柄可以等待也可以直接丢弃
    Started(JoinHandle<WarmupReport>),
    Skipped(SkipReason),
}

impl WarmupDispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, WarmupDispatch::Started(_))
    }
}

enum Outcome {
    Loaded,
    Empty,
    Failed,
}

/// 正在预热的所有者标记，drop 时移除
struct InFlight {
    owners: Arc<DashMap<String, ()>>,
    owner: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.owners.remove(&self.owner);
    }
}

/// 正在预热的所有者集合，同一服务的所有代理共享一份
pub type InFlightOwners = Arc<DashMap<String, ()>>;

/// 预热代理
///
/// 预热是纯优化：所有失败只记录日志，不会返回给调用方
#[derive(Clone)]
pub struct WarmupAgent {
    keyspace: KeySpace,
    cache: Arc<CacheFacade>,
    loader: Arc<dyn WarmupLoader>,
    config: WarmupConfig,
    in_flight: InFlightOwners,
}

impl WarmupAgent {
    /// 创建预热代理
    ///
    /// # 参数
    ///
    /// * `in_flight` - 正在预热的所有者集合，传入同一份集合的代理之间按所有者去重
    pub fn new(
        keyspace: KeySpace,
        cache: Arc<CacheFacade>,
        loader: Arc<dyn WarmupLoader>,
        config: WarmupConfig,
        in_flight: InFlightOwners,
    ) -> Self {
        Self {
            keyspace,
            cache,
            loader,
            config,
            in_flight,
        }
    }

    /// 为所有者触发一次预热
    ///
    /// 所有者ID非法、已在进行或金丝雀键已存在时直接跳过；否则在独立任务中填充，
    /// 该任务不继承调用方的 span，调用方请求结束后继续运行
    pub async fn warmup(&self, owner: &str) -> WarmupDispatch {
        if !self.config.enabled {
            debug!("Cache warmup is disabled, skipping owner {}", owner);
            return WarmupDispatch::Skipped(SkipReason::Disabled);
        }

        let canary = match self.keyspace.render(&CANARY, owner, &[]) {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping warmup: {}", e);
                return WarmupDispatch::Skipped(SkipReason::InvalidOwner);
            }
        };

        if self.in_flight.insert(owner.to_string(), ()).is_some() {
            debug!("Warmup already in flight for owner {}", owner);
            return WarmupDispatch::Skipped(SkipReason::InFlight);
        }
        let guard = InFlight {
            owners: self.in_flight.clone(),
            owner: owner.to_string(),
        };

        if self.cache.contains(&canary).await {
            debug!("Canary {} present, owner {} already warm", canary, owner);
            return WarmupDispatch::Skipped(SkipReason::AlreadyWarm);
        }

        let agent = self.clone();
        let owner = owner.to_string();
        let span = info_span!(parent: None, "warmup", owner = %owner);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                agent.run(&owner).await
            }
            .instrument(span),
        );
        WarmupDispatch::Started(handle)
    }

    async fn run(&self, owner: &str) -> WarmupReport {
        let limit = Duration::from_secs(self.config.timeout_seconds);
        match tokio::time::timeout(limit, self.populate(owner)).await {
            Ok(report) => {
                info!(
                    "Cache warmup completed: owner={}, loaded={}, empty={}, failed={}",
                    owner, report.loaded, report.empty, report.failed
                );
                report
            }
            Err(_) => {
                warn!(
                    "Cache warmup timed out after {} seconds: owner={}",
                    self.config.timeout_seconds, owner
                );
                WarmupReport {
                    timed_out: true,
                    ..Default::default()
                }
            }
        }
    }

    /// 并发填充预热集合，全部无错时最后写入金丝雀键
    async fn populate(&self, owner: &str) -> WarmupReport {
        let outcomes = join_all(WARM_SET.iter().map(|t| self.warm_one(owner, t))).await;

        let mut report = WarmupReport::default();
        for outcome in &outcomes {
            report.tally(outcome);
        }

        if report.failed > 0 {
            warn!(
                "Skipping canary for owner {}: {} keys failed to load",
                owner, report.failed
            );
            return report;
        }
        let canary = self.warm_one(owner, &CANARY).await;
        report.tally(&canary);
        report
    }

    async fn warm_one(&self, owner: &str, template: &KeyTemplate) -> Outcome {
        let key = match self.keyspace.render(template, owner, &[]) {
            Ok(key) => key,
            Err(e) => {
                warn!("Warmup key for {} not renderable: {}", template.name, e);
                return Outcome::Failed;
            }
        };
        match self.loader.load(owner, template).await {
            Ok(Some(value)) if !value.is_null() => {
                self.cache.put(&key, &value, template.ttl).await;
                Outcome::Loaded
            }
            Ok(_) => Outcome::Empty,
            Err(e) => {
                warn!("Warmup load failed for {}: {:#}", key, e);
                Outcome::Failed
            }
        }
    }
}

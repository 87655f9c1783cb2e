//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};

/// 共享层健康状态指标值
pub const HEALTH_DEGRADED: u8 = 0;
pub const HEALTH_CONNECTED: u8 = 1;
pub const HEALTH_DISCONNECTED: u8 = 2;

/// 指标收集器
///
/// 每个 `CacheService` 实例持有自己的收集器，测试之间互不干扰
#[derive(Debug)]
pub struct CacheMetrics {
    /// 请求总数统计
    /// key: "layer:op:result"
    requests_total: DashMap<String, u64>,
    /// 共享层健康状态
    shared_health: AtomicU8,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            requests_total: DashMap::new(),
            shared_health: AtomicU8::new(HEALTH_DISCONNECTED),
        }
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `layer` - 缓存层（local/shared/stampede）
    /// * `op` - 操作类型（get/put/drop/...）
    /// * `result` - 操作结果（hit/miss/error/...）
    pub fn record_request(&self, layer: &str, op: &str, result: &str) {
        let key = format!("{}:{}:{}", layer, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 读取某个计数器的当前值
    pub fn count(&self, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", layer, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// 设置共享层健康状态（0: 降级, 1: 已连接, 2: 未连接）
    pub fn set_health(&self, status: u8) {
        self.shared_health.store(status, Ordering::Relaxed);
    }

    pub fn health(&self) -> u8 {
        self.shared_health.load(Ordering::Relaxed)
    }

    /// 获取指标字符串
    ///
    /// 将所有指标格式化为文本，用于监控系统采集
    pub fn render(&self, service: &str) -> String {
        let mut rows: Vec<(String, u64)> = self
            .requests_total
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        rows.sort();

        let mut output = String::new();
        for (k, v) in rows {
            let parts: Vec<&str> = k.splitn(3, ':').collect();
            if parts.len() == 3 {
                output.push_str(&format!(
                    "cache_requests_total{{service=\"{}\", layer=\"{}\", op=\"{}\", result=\"{}\"}} {}\n",
                    service, parts[0], parts[1], parts[2], v
                ));
            }
        }
        output.push_str(&format!(
            "cache_shared_health_status{{service=\"{}\"}} {}\n",
            service,
            self.health()
        ));
        output
    }
}

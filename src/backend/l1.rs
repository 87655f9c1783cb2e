//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地层（L1）的实现：有界、固定短TTL的进程内缓存。

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// 本地层缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// 序列化后的载荷
    pub value: Vec<u8>,
    /// 过期时间
    pub expires_at: Instant,
}

/// 本地层实现
///
/// 所有条目使用同一个固定TTL，调用方无法覆盖。过期在读取时惰性检查，
/// 没有后台清理任务。超过容量时淘汰过期时间最近的四分之一条目。
#[derive(Debug)]
pub struct LocalTier {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
}

impl LocalTier {
    /// 创建新的本地层实例
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数
    /// * `ttl` - 固定TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity + 1),
            capacity,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 获取缓存值（字节形式）
    ///
    /// 返回前检查过期，过期条目被顺手删除
    #[instrument(skip(self), level = "debug")]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                debug!("L1 get: key={}, found=true", key);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
            debug!("L1 get: key={}, expired=true, removed", key);
        }
        None
    }

    /// 设置缓存值，过期时间总是重置为 now + 固定TTL
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub fn set(&self, key: &str, value: Vec<u8>) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key.to_string(), entry);
        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    /// 删除缓存项，返回条目是否存在
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// 删除所有以 `prefix` 开头的条目，返回删除数量
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// 清空本地层
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 当前条目数（包括尚未被惰性清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 淘汰过期时间最近的四分之一条目（至少一个）
    ///
    /// 已过期的条目排在最前面，自然先被淘汰
    fn evict(&self) {
        let mut by_expiry: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|e| (e.value().expires_at, e.key().clone()))
            .collect();
        let target = by_expiry.len().div_ceil(4).max(1);
        by_expiry.sort_unstable();
        for (_, key) in by_expiry.into_iter().take(target) {
            self.entries.remove(&key);
        }
        debug!(
            "L1 evict: removed {} entries, {} remaining",
            target,
            self.entries.len()
        );
    }
}

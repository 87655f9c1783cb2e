//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的共享层后端，用于测试和本地开发，无需 Redis。

use super::SharedBackend;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 进程内共享层后端
///
/// 语义与 Redis 保持一致：惰性过期、`INCR` 只接受整数文本。
/// 可以模拟存储不可达和慢响应，并统计每种操作的调用次数。
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, (Vec<u8>, Option<Instant>)>,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
    calls: DashMap<&'static str, usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可达
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// 模拟每个命令的响应延迟
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// 某种操作被调用的次数（包括失败的调用）
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map(|v| *v).unwrap_or(0)
    }

    /// 绕过可达性检查直接写入原始载荷
    pub fn insert_raw(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let expire_at = ttl.map(|t| Instant::now() + t);
        self.entries
            .insert(key.to_string(), (value.to_vec(), expire_at));
    }

    /// 绕过可达性检查读取原始载荷
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.live(key)
    }

    /// 未过期条目的数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().1.map_or(true, |at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            debug!("MemoryBackend {}: simulated connection refused", op);
            return Err(CacheError::BackendError("connection refused".to_string()));
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.1 {
                Some(at) if at <= now => true,
                _ => return Some(entry.0.clone()),
            },
            None => return None,
        };
        if expired {
            self.entries.remove_if(key, |_, v| v.1.is_some_and(|at| at <= now));
        }
        None
    }
}

#[async_trait]
impl SharedBackend for MemoryBackend {
    async fn connect(&self) -> Result<()> {
        self.enter("connect").await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter("get").await?;
        Ok(self.live(key))
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()> {
        self.enter("set").await?;
        let expire_at = Instant::now() + Duration::from_secs(ttl);
        self.entries.insert(key.to_string(), (value, Some(expire_at)));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.enter("delete").await?;
        let mut removed = 0;
        for key in keys {
            if self.live(key).is_some() && self.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        self.enter("delete_matching").await?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in matching {
            if self.live(&key).is_some() && self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.enter("exists").await?;
        Ok(self.live(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.enter("incr").await?;
        // 过期的计数器视为不存在
        self.live(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| (b"0".to_vec(), None));
        let current: i64 = std::str::from_utf8(&entry.0)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                CacheError::BackendError("value is not an integer or out of range".to_string())
            })?;
        let next = current + 1;
        entry.0 = next.to_string().into_bytes();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        self.enter("expire").await?;
        if self.live(key).is_none() {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.1 = Some(Instant::now() + Duration::from_secs(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.enter("ping").await
    }
}

/// Redis 风格的 glob 匹配，支持 `*`、`?` 和反斜杠转义
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                    pi += 2;
                    ti += 1;
                    continue;
                }
                c if c != '\\' && c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

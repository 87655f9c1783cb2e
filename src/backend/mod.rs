//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的后端实现：本地有界缓存，以及共享层的远端存储契约。

pub mod l1;
pub mod l2;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;

/// 远端键值存储契约
///
/// 后端只负责执行命令并如实返回错误，降级与吸收错误由
/// [`crate::client::l2::SharedTier`] 负责
#[async_trait]
pub trait SharedBackend: Send + Sync {
    /// 建立（或重建）连接并做一次存活探测
    async fn connect(&self) -> Result<()>;

    /// 读取原始载荷
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入载荷并设置过期时间（秒）
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()>;

    /// 删除若干键，返回实际删除的数量
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// 删除所有匹配 glob 模式的键，返回实际删除的数量
    async fn delete_matching(&self, pattern: &str) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// 原子自增，返回自增后的值
    async fn incr(&self, key: &str) -> Result<i64>;

    /// 设置过期时间（秒），键不存在时返回 false
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool>;

    /// 存活探测
    async fn ping(&self) -> Result<()>;
}

/// 将前缀转义为 glob 模式并追加 `*`
///
/// 所有者ID可能包含 `*`、`?`、`[`、`]`、`\`，必须按字面匹配
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 这些错误只在层级边界内部流转：`SharedTier` 会把它们吸收为"无数据"信号，
/// 调用方只会看到配置错误、非法键参数以及自己工厂函数返回的业务错误。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 存储的载荷无法解码（损坏或旧格式）
    #[error("Corrupt payload for key {key}: {reason}")]
    CorruptPayload { key: String, reason: String },

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 共享层尚未建立连接
    #[error("Shared store not connected")]
    NotConnected,

    /// 后端错误
    #[error("Backend error: {0}")]
    BackendError(String),

    /// 所有者ID或键参数无法安全地放进键中
    #[error("Invalid key segment '{segment}': {reason}")]
    InvalidKey { segment: String, reason: String },

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// 是否为远端存储的瞬时故障（不可达、超时等）
    ///
    /// 瞬时故障会让共享层进入降级状态，而不是向调用方抛出
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::RedisError(_)
                | CacheError::Timeout(_)
                | CacheError::NotConnected
                | CacheError::BackendError(_)
        )
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;

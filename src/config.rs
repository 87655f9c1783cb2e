//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use crate::keyspace::KeySpace;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 缓存系统配置
///
/// 由应用的组合根加载后传给 [`crate::manager::CacheService`]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 键命名空间
    pub namespace: String,
    /// 本地层配置
    pub local: LocalConfig,
    /// 共享层配置
    pub shared: SharedConfig,
    /// 防击穿配置
    pub stampede: StampedeConfig,
    /// 预热配置
    pub warmup: WarmupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "bm".to_string(),
            local: LocalConfig::default(),
            shared: SharedConfig::default(),
            stampede: StampedeConfig::default(),
            warmup: WarmupConfig::default(),
        }
    }
}

/// 本地层（L1）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LocalConfig {
    /// 最大条目数
    pub capacity: usize,
    /// 固定TTL（秒），对所有条目一律生效
    pub ttl_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            ttl_secs: 3,
        }
    }
}

impl LocalConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 共享层（L2）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SharedConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 降级后两次重连尝试之间的冷却时间（秒）
    pub reconnect_cooldown_secs: u64,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 2000,
            command_timeout_ms: 500,
            reconnect_cooldown_secs: 30,
        }
    }
}

impl SharedConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }
}

/// 防击穿（单飞）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StampedeConfig {
    /// 本地锁的有效期（毫秒）
    pub lock_ttl_ms: u64,
    /// 等待其他计算完成的固定休眠时间（毫秒）
    pub wait_ms: u64,
}

impl Default for StampedeConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 10_000,
            wait_ms: 100,
        }
    }
}

impl StampedeConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// 预热配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct WarmupConfig {
    /// 是否启用预热
    pub enabled: bool,
    /// 单次预热的超时时间（秒）
    pub timeout_seconds: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 30,
        }
    }
}

impl Config {
    /// 从 TOML 文本解析并验证配置
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从 TOML 文件加载并验证配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 验证配置
    ///
    /// 检查取值范围，并确保本地层TTL严格小于任何业务域TTL，
    /// 这是跨进程最大陈旧时间的上界
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.namespace.is_empty() {
            return Err("namespace cannot be empty".to_string());
        }

        if self.namespace.contains(':') || !self.namespace.is_ascii() {
            return Err(format!(
                "namespace '{}' must be ASCII and cannot contain ':'",
                self.namespace
            ));
        }

        if self.local.capacity == 0 {
            return Err("local capacity cannot be zero".to_string());
        }

        if self.local.capacity > 1_000_000 {
            return Err("local capacity cannot exceed 1,000,000".to_string());
        }

        if self.local.ttl_secs == 0 {
            return Err("local ttl_secs cannot be zero".to_string());
        }

        let min_domain_ttl = KeySpace::min_ttl();
        if self.local.ttl_secs >= min_domain_ttl {
            return Err(format!(
                "local ttl_secs ({}) must be < smallest domain TTL ({})",
                self.local.ttl_secs, min_domain_ttl
            ));
        }

        let timeout = self.shared.connection_timeout_ms;
        if !(100..=30000).contains(&timeout) {
            return Err("shared connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        let timeout = self.shared.command_timeout_ms;
        if !(10..=60000).contains(&timeout) {
            return Err("shared command_timeout_ms must be between 10 and 60000 ms".to_string());
        }

        if self.shared.reconnect_cooldown_secs == 0 || self.shared.reconnect_cooldown_secs > 3600 {
            return Err(
                "shared reconnect_cooldown_secs must be between 1 and 3600 seconds".to_string(),
            );
        }

        if self.stampede.lock_ttl_ms == 0 {
            return Err("stampede lock_ttl_ms cannot be zero".to_string());
        }

        if self.stampede.wait_ms >= self.stampede.lock_ttl_ms {
            return Err(format!(
                "stampede wait_ms ({}) must be < lock_ttl_ms ({})",
                self.stampede.wait_ms, self.stampede.lock_ttl_ms
            ));
        }

        if self.warmup.enabled
            && (self.warmup.timeout_seconds == 0 || self.warmup.timeout_seconds > 3600)
        {
            return Err("warmup timeout_seconds must be between 1 and 3600 seconds".to_string());
        }

        Ok(())
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享层后端。

use super::SharedBackend;
use crate::config::SharedConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// SCAN 每批返回的键数量提示
const SCAN_BATCH: usize = 500;

/// Redis共享层后端
///
/// 通过 `ConnectionManager`（多路复用、自动重连）访问 Redis。
/// 连接在 `connect` 中建立，之前的所有命令都返回 `NotConnected`。
pub struct RedisBackend {
    client: Client,
    manager: RwLock<Option<ConnectionManager>>,
    connection_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisBackend")
    }
}

impl RedisBackend {
    /// 创建新的Redis后端实例
    ///
    /// 只解析连接字符串，不做网络 I/O
    ///
    /// # 参数
    ///
    /// * `config` - 共享层配置
    ///
    /// # 返回值
    ///
    /// 返回新的RedisBackend实例，连接字符串非法时返回配置错误
    pub fn new(config: &SharedConfig) -> Result<Self> {
        let client = Client::open(config.connection_string.expose_secret())
            .map_err(|e| CacheError::ConfigError(format!("Invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            manager: RwLock::new(None),
            connection_timeout: config.connection_timeout(),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        self.manager
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotConnected)
    }
}

#[async_trait]
impl SharedBackend for RedisBackend {
    #[instrument(skip(self), level = "info", name = "redis_connect")]
    async fn connect(&self) -> Result<()> {
        let mut manager = match timeout(
            self.connection_timeout,
            self.client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::Timeout(format!(
                    "Connection timed out after {}ms",
                    self.connection_timeout.as_millis()
                )));
            }
        };
        let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
        debug!("RedisBackend connect: PING -> {}", pong);
        *self.manager.write().await = Some(manager);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let mut cursor = 0u64;
        let mut removed = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += n;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        debug!("delete_matching: pattern={}, removed={}", pattern, removed);
        Ok(removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    #[instrument(skip(self), level = "debug")]
    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let applied: bool = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl)
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

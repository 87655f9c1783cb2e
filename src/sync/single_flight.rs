//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的防击穿锁表（单飞）。
//!
//! 锁只在本进程内生效且仅作提示用途：它限制同一进程内对同一个键的并发重算，
//! 跨进程的重复计算是允许的。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// 锁记录
#[derive(Debug, Clone, Copy)]
struct Lock {
    held_until: Instant,
    token: Uuid,
}

/// 进程内锁表
#[derive(Debug)]
pub struct StampedeLocks {
    held: DashMap<String, Lock>,
    ttl: Duration,
}

impl StampedeLocks {
    /// 创建锁表
    ///
    /// # 参数
    ///
    /// * `ttl` - 锁的有效期，持有者崩溃或卡住时锁会在此之后自动失效
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: DashMap::new(),
            ttl,
        }
    }

    /// 尝试获取键上的锁
    ///
    /// 未被持有或已过期时获取成功，返回的守卫在 drop 时释放锁；
    /// 否则返回 `None`
    pub fn try_acquire(&self, key: &str) -> Option<LockGuard<'_>> {
        let now = Instant::now();
        let token = Uuid::new_v4();
        let lock = Lock {
            held_until: now + self.ttl,
            token,
        };
        match self.held.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().held_until > now {
                    return None;
                }
                debug!("stampede lock expired, taking over: key={}", key);
                occupied.insert(lock);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lock);
            }
        }
        Some(LockGuard {
            locks: self,
            key: key.to_string(),
            token,
        })
    }

    /// 键上是否有未过期的锁
    pub fn is_held(&self, key: &str) -> bool {
        let now = Instant::now();
        self.held
            .get(key)
            .map(|lock| lock.held_until > now)
            .unwrap_or(false)
    }

    /// 当前锁表中的记录数（包括已过期但尚未被接管的记录）
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// 锁守卫
///
/// 无论计算成功、失败、panic 还是 future 被取消，drop 时都会释放锁。
/// 只删除自己持有的那把锁，过期后被他人接管的锁不受影响。
#[derive(Debug)]
pub struct LockGuard<'a> {
    locks: &'a StampedeLocks,
    key: String,
    token: Uuid,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let token = self.token;
        self.locks
            .held
            .remove_if(&self.key, |_, lock| lock.token == token);
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享层的健康状态机和重连节流逻辑。

use crate::metrics::{HEALTH_CONNECTED, HEALTH_DEGRADED, HEALTH_DISCONNECTED};
use std::time::Duration;
use tokio::time::Instant;

/// 健康状态枚举
///
/// 初始为 `Disconnected`，连接成功后进入 `Connected`，
/// 任何操作失败都会转入 `Degraded` 并记录错误
#[derive(Debug, Clone, PartialEq)]
pub enum HealthState {
    /// 尚未连接
    Disconnected,
    /// 已连接
    Connected { since: Instant },
    /// 降级状态
    Degraded {
        since: Instant,
        failure_count: u32,
        last_error: String,
    },
}

impl HealthState {
    pub fn is_connected(&self) -> bool {
        matches!(self, HealthState::Connected { .. })
    }

    /// 指标中使用的状态码
    pub fn status_code(&self) -> u8 {
        match self {
            HealthState::Disconnected => HEALTH_DISCONNECTED,
            HealthState::Connected { .. } => HEALTH_CONNECTED,
            HealthState::Degraded { .. } => HEALTH_DEGRADED,
        }
    }
}

/// 健康跟踪器
///
/// 保存当前状态和上一次连接尝试（或失败）的时间。
/// 冷却窗口内最多允许一次重连尝试，避免对不可达的存储空转。
#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: HealthState,
    last_attempt: Option<Instant>,
    cooldown: Duration,
}

impl HealthTracker {
    /// 创建新的健康跟踪器
    ///
    /// # 参数
    ///
    /// * `cooldown` - 两次重连尝试之间的最小间隔
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: HealthState::Disconnected,
            last_attempt: None,
            cooldown,
        }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// 当前时刻是否允许发起一次连接尝试
    pub fn should_attempt(&self, now: Instant) -> bool {
        match self.state {
            HealthState::Connected { .. } => false,
            _ => match self.last_attempt {
                None => true,
                Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            },
        }
    }

    /// 标记开始一次连接尝试
    pub fn begin_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// 连接成功
    pub fn on_connected(&mut self, now: Instant) {
        self.state = HealthState::Connected { since: now };
    }

    /// 操作或连接失败，进入降级状态并从此刻开始计算冷却窗口
    pub fn on_failure(&mut self, now: Instant, error: String) {
        self.last_attempt = Some(now);
        self.state = match &self.state {
            HealthState::Degraded {
                since,
                failure_count,
                ..
            } => HealthState::Degraded {
                since: *since,
                failure_count: failure_count.saturating_add(1),
                last_error: error,
            },
            _ => HealthState::Degraded {
                since: now,
                failure_count: 1,
                last_error: error,
            },
        };
    }
}

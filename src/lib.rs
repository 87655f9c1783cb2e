//! markcache - 书签服务的双层缓存
//!
//! 进程内的有界短TTL本地层叠加跨进程共享层（Redis），
//! 提供防击穿读穿、集中的事件失效路由和尽力而为的预热。
//! 共享层故障只影响延迟，不影响正确性。

pub use serde;
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keyspace;
pub mod manager;
pub mod metrics;
pub mod recovery;
pub mod serialization;
pub mod sync;
pub mod telemetry;

pub use client::{CacheFacade, SharedTier};
pub use config::Config;
pub use error::{CacheError, Result};
pub use keyspace::KeySpace;
pub use manager::CacheService;
pub use sync::invalidation::{ChangeEvent, InvalidationRouter};
pub use sync::warmup::{SkipReason, WarmupAgent, WarmupDispatch, WarmupLoader, WarmupReport};

/// markcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的协调机制，包括防击穿锁、失效路由和预热。

pub mod invalidation;
pub mod single_flight;
pub mod warmup;

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享层的故障恢复机制。

pub mod health;

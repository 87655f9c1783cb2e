//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存客户端：共享层客户端和双层缓存门面。

pub mod l2;
pub mod two_level;

pub use l2::SharedTier;
pub use two_level::CacheFacade;

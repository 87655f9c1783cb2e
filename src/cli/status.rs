//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态查询命令的实现。

use crate::cli::StatusArgs;
use crate::config::Config;
use crate::manager::CacheService;
use crate::recovery::health::HealthState;
use anyhow::Result;
use secrecy::ExposeSecret;

pub async fn execute(config: Config, args: &StatusArgs) -> Result<()> {
    let service = CacheService::connect(config).await?;
    let shared = service.cache().shared();
    let reachable = shared.ping().await;
    let state = shared.state().await;

    println!("Namespace: {}", service.keyspace().namespace());
    println!("Shared:    {}", describe(&state, args.verbose));
    println!("Ping:      {}", if reachable { "ok" } else { "failed" });

    if args.verbose {
        let config = service.config();
        println!(
            "Local:     capacity={}, ttl={}s",
            config.local.capacity, config.local.ttl_secs
        );
        println!(
            "Store:     {}",
            redact(config.shared.connection_string.expose_secret())
        );
        println!();
        print!("{}", service.metrics().render(service.keyspace().namespace()));
    }

    Ok(())
}

fn describe(state: &HealthState, verbose: bool) -> String {
    match state {
        HealthState::Disconnected => "DISCONNECTED".to_string(),
        HealthState::Connected { since } => {
            if verbose {
                format!("CONNECTED ({}s)", since.elapsed().as_secs())
            } else {
                "CONNECTED".to_string()
            }
        }
        HealthState::Degraded {
            since,
            failure_count,
            last_error,
        } => {
            if verbose {
                format!(
                    "DEGRADED ({} failures, {}s ago, last error: {})",
                    failure_count,
                    since.elapsed().as_secs(),
                    last_error
                )
            } else {
                "DEGRADED".to_string()
            }
        }
    }
}

/// 隐藏连接字符串中的密码
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &url[..scheme], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

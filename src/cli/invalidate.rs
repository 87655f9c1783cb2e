//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了手动失效命令的实现。

use crate::cli::{EventKind, InvalidateArgs};
use crate::config::Config;
use crate::manager::CacheService;
use crate::sync::invalidation::ChangeEvent;
use anyhow::{bail, Result};

pub async fn execute(config: Config, args: &InvalidateArgs) -> Result<()> {
    let event = to_event(args)?;
    let service = CacheService::connect(config).await?;
    let plan = service.router().plan(&event)?;

    println!("Event: {}", event);
    for key in &plan.keys {
        println!("  key    {}", key);
    }
    for prefix in &plan.families {
        println!("  family {}*", prefix);
    }

    if args.dry_run {
        println!("Dry run, nothing dropped.");
        return Ok(());
    }

    if !service.cache().shared().available().await {
        bail!("Shared tier is unavailable, nothing was invalidated");
    }
    let removed = service.router().dispatch(&event).await?;
    println!("\n✅ Dropped {} keys from the shared tier", removed);
    Ok(())
}

fn to_event(args: &InvalidateArgs) -> Result<ChangeEvent> {
    let owner = args.owner.clone();
    if args.link_id.is_some() && args.event != EventKind::Link {
        bail!("--link-id is only valid for link events");
    }
    Ok(match args.event {
        EventKind::Link => ChangeEvent::Link {
            owner,
            link_id: args.link_id.clone(),
        },
        EventKind::Folder => ChangeEvent::Folder { owner },
        EventKind::Tag => ChangeEvent::Tag { owner },
        EventKind::User => ChangeEvent::User { owner },
        EventKind::Bulk => ChangeEvent::Bulk { owner },
    })
}

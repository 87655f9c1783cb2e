//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键列表命令的实现。

use crate::cli::KeysArgs;
use crate::config::Config;
use crate::keyspace::{KeySpace, TEMPLATES};
use anyhow::Result;

pub fn execute(config: &Config, args: &KeysArgs) -> Result<()> {
    let keyspace = KeySpace::new(config.namespace.clone());
    print!("{}", render(&keyspace, &args.owner)?);
    Ok(())
}

/// 每行一个键（或键族前缀）及其业务域TTL
fn render(keyspace: &KeySpace, owner: &str) -> Result<String> {
    let mut out = String::new();
    for template in TEMPLATES {
        let key = if template.extra_slots() == 0 {
            keyspace.render(template, owner, &[])?
        } else {
            format!("{}*", keyspace.family_prefix(template, owner)?)
        };
        out.push_str(&format!("{:<32} {:>4}s  {}\n", key, template.ttl, template.name));
    }
    Ok(out)
}

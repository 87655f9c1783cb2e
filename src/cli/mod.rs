//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "markcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Query shared tier status and metrics")]
    Status(StatusArgs),

    #[command(name = "keys", about = "List every cache key of an owner")]
    Keys(KeysArgs),

    #[command(name = "invalidate", about = "Run an invalidation event for an owner")]
    Invalidate(InvalidateArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Show detailed information")]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[arg(short, long, help = "Owner id")]
    pub owner: String,
}

#[derive(Parser, Debug)]
pub struct InvalidateArgs {
    #[arg(short, long, help = "Owner id")]
    pub owner: String,

    #[arg(value_enum, help = "Kind of change that happened")]
    pub event: EventKind,

    #[arg(long, help = "Changed link id (link events only)")]
    pub link_id: Option<String>,

    #[arg(long, help = "Only print the keys that would be dropped")]
    pub dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Link,
    Folder,
    Tag,
    User,
    Bulk,
}

mod invalidate;
mod keys;
mod status;

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_logging("warn");
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::Status(args) => status::execute(config, args).await,
        Commands::Keys(args) => keys::execute(&config, args),
        Commands::Invalidate(args) => invalidate::execute(config, args).await,
    }
}

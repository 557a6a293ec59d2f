//! `recon` keeps a cache area in line with a JSON Lines or CSV source.
//!
//! ```text
//! recon [--config PATH] [-v...] import <AREA> <PATH>
//! recon [--config PATH] [-v...] trim <AREA> <PATH>
//! recon [--config PATH] [-v...] reset <AREA> [PATH]
//! ```

mod error;
mod setup;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use recon_area::CacheArea;
use recon_config::{Config, LogLevel};
use recon_model::SchemaRegistry;
use recon_source::Source;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "recon", version, about = "Reconcile cache areas against their sources")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Increase logging verbosity; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or update cached entries for every source item.
    Import { area: String, path: PathBuf },
    /// Import, then delete cached entries no longer in the source.
    Trim { area: String, path: PathBuf },
    /// Clear the area and recreate its backing storage.
    Reset { area: String, path: Option<PathBuf> },
}

impl Command {
    fn area(&self) -> &str {
        match self {
            Self::Import { area, .. } | Self::Trim { area, .. } | Self::Reset { area, .. } => area,
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Self::Import { path, .. } | Self::Trim { path, .. } => Some(path),
            Self::Reset { path, .. } => path.as_deref(),
        }
    }
}

/// The configured level, raised one step per `-v`.
fn level(configured: LogLevel, verbose: u8) -> Level {
    const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
    let base = LEVELS.iter().position(|level| *level == Level::from(configured)).unwrap_or(2);
    LEVELS[(base + usize::from(verbose)).min(LEVELS.len() - 1)]
}

async fn run(area: &CacheArea, command: &Command, source: Option<&dyn Source>) -> Result<String> {
    let source = || source.ok_or_raise(|| ErrorKind::Unsupported("a source path is required".to_string()));
    match command {
        Command::Import { .. } => {
            area.initialize().await.or_raise(|| ErrorKind::Area)?;
            let count = area.import_source(source()?).await.or_raise(|| ErrorKind::Area)?;
            Ok(format!("{}: {count} created or modified", area.name()))
        },
        Command::Trim { .. } => {
            area.initialize().await.or_raise(|| ErrorKind::Area)?;
            let trim = area.trim(source()?).await.or_raise(|| ErrorKind::Area)?;
            Ok(format!(
                "{}: {} created or modified, {} deleted",
                area.name(),
                trim.updated,
                trim.deleted
            ))
        },
        Command::Reset { .. } => {
            area.reset().await.or_raise(|| ErrorKind::Area)?;
            Ok(format!("{}: reset", area.name()))
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing_subscriber::fmt()
        .with_max_level(level(config.log_level, cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let registry = SchemaRegistry::new();
    let (area, source) = setup::area(&config, cli.command.area(), cli.command.path(), &registry).await?;
    match run(&area, &cli.command, source.as_deref()).await {
        Ok(summary) => {
            area.commit().await.or_raise(|| ErrorKind::Area)?;
            println!("{summary}");
            Ok(())
        },
        Err(e) => {
            tracing::error!(area = area.name(), error = ?e, "Rolling back");
            if let Err(rollback) = area.rollback().await {
                tracing::error!(area = area.name(), error = ?rollback, "Rollback failed");
            }
            Err(e)
        },
    }
}

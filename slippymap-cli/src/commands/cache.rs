//! Cache management CLI commands.

use clap::Subcommand;
use slippymap::config::format_size;

use super::common::{disk_directory, load_config, open_cache_chain};
use crate::error::CliError;
use crate::GlobalArgs;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show per-tier cache statistics
    Stats,
    /// Remove every cached fragment
    Clear,
    /// Remove fragments not read within the retention period
    Purge,
}

pub async fn run(global: &GlobalArgs, action: CacheAction) -> Result<(), CliError> {
    let config = load_config(global.config.as_deref())?;
    let chain = open_cache_chain(&config).await?;
    println!("Disk cache: {}", disk_directory(&config).display());

    match action {
        CacheAction::Stats => {
            for (tier, stats) in chain.stats() {
                println!("  [{}]", tier);
                println!("    Entries: {}", stats.entries);
                println!("    Size:    {}", format_size(stats.size_bytes as usize));
            }
            println!("  Retention: {}h", config.cache.retention_hours);
        }
        CacheAction::Clear => {
            let removed = chain.clear().await;
            println!("Removed {} entries", removed);
        }
        CacheAction::Purge => {
            for (tier, result) in chain.purge_expired().await {
                println!(
                    "  [{}] removed {} entries, freed {}",
                    tier,
                    result.entries_removed,
                    format_size(result.bytes_freed as usize)
                );
            }
        }
    }
    Ok(())
}

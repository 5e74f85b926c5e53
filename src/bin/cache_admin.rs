//! Inspect and maintain a simulation cache file
//!
//! Usage: cargo run --bin cache_admin -- stats
//!        cargo run --bin cache_admin -- invalidate goal:123
//!        cargo run --bin cache_admin -- merge other_cache.json

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use goal_probability::cache::{CacheConfig, SimulationCache};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "cache_admin", about = "Inspect and maintain the goal simulation cache")]
struct Cli {
    #[arg(long, help = "Cache file; defaults to the configured cache path")]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print size, hit counters and memory estimate
    Stats,
    /// List cached keys
    Keys,
    /// Remove entries whose key contains PATTERN, or everything
    Invalidate { pattern: Option<String> },
    /// Drop expired entries
    Cleanup,
    /// Fold another cache file in, keeping the newer entry per key
    Merge { other: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = CacheConfig::from_env();
    let path = cli.file.unwrap_or_else(|| config.cache_path());

    // Values stay opaque so any cache file can be maintained
    let cache: SimulationCache<Value> = SimulationCache::with_config(&config);
    cache.set_cache_file(&path);
    let loaded = cache.load(&path);

    match cli.command {
        Command::Stats => {
            if !loaded {
                println!("No readable cache at {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&cache.get_stats())?);
        }
        Command::Keys => {
            let mut keys = cache.keys();
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        Command::Invalidate { pattern } => {
            let removed = cache.invalidate(pattern.as_deref());
            println!("Removed {} entries", removed);
            save(&cache, &path)?;
        }
        Command::Cleanup => {
            let removed = cache.cleanup_expired();
            println!("Removed {} expired entries", removed);
            save(&cache, &path)?;
        }
        Command::Merge { other } => {
            let incoming: SimulationCache<Value> = SimulationCache::with_config(&config);
            if !incoming.load(&other) {
                bail!("could not read cache file {}", other.display());
            }
            let merged = cache.merge(&incoming);
            println!("Merged {} entries from {}", merged, other.display());
            save(&cache, &path)?;
        }
    }

    Ok(())
}

fn save(cache: &SimulationCache<Value>, path: &Path) -> Result<()> {
    if !cache.save(path) {
        bail!("failed to write cache file {}", path.display());
    }
    println!("Saved {} entries to {}", cache.len(), path.display());
    Ok(())
}

//! # depsync CLI Entry Point
//!
//! With no arguments, reads `DEPS` from the current directory and syncs every
//! allow-listed dependency from the mirror.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;

use depsync::config::SyncConfig;
use depsync::fetch::Fetcher;
use depsync::manifest;
use depsync::ui;

#[derive(Parser)]
#[command(name = "depsync")]
#[command(about = "Sync curated crashpad dependencies from an archive mirror", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Base directory for the manifest and every dependency path
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Manifest file, relative to the root unless absolute [default: DEPS]
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Override the mirror base URL
    #[arg(long)]
    mirror: Option<String>,
    /// Parse the manifest and print the records without syncing
    #[arg(long)]
    list: bool,
    /// Print the listing as JSON (with --list)
    #[arg(long, requires = "list")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SyncConfig::load(&cli.root)?;
    if let Some(mirror) = cli.mirror {
        config.mirror_base = mirror;
    }

    let manifest_path = cli
        .root
        .join(cli.manifest.unwrap_or_else(|| PathBuf::from(&config.manifest_name)));
    let records = manifest::load_records(&manifest_path, &config)?;

    if cli.list {
        if cli.json {
            let json = serde_json::to_string_pretty(&records)
                .context("Failed to serialize dependency records")?;
            println!("{}", json);
        } else {
            ui::print_records(&records);
        }
        return Ok(());
    }

    println!(
        "{} Syncing {} dependencies from {}",
        "📦".blue(),
        records.len(),
        manifest_path.display()
    );

    let fetcher = Fetcher::new(&cli.root, config);
    let synced = fetcher.fetch_all(&records)?;

    println!("{} Synced {} dependencies.", "✓".green(), synced);
    Ok(())
}

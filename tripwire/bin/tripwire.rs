#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use tripwire::config::{CONFIG_ENV, find_config_file, load};

/// Queue consumer that backs off and opens its circuit on an unhealthy downstream
#[derive(Parser, Debug)]
#[command(name = "tripwire")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(
        cli.config.as_deref(),
        std::env::var(CONFIG_ENV).ok().as_deref(),
    )?;
    let tripwire = load(&config_path)?;

    tripwire.run().await
}

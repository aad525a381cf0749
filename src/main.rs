mod cli;
mod command_handlers;
mod config;
mod download;
mod error;
mod host_config;
mod installer;
mod paths;
mod platform;
mod status;
mod vault;
mod versioning;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::Settings;
use crate::vault::VaultContext;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())
        .context("loading settings")?
        .with_overrides(cli.platform, cli.arch);

    let root = match cli.vault {
        Some(p) => p,
        None => std::env::current_dir().context("reading current directory")?,
    };
    let root = paths::resolve(&root).context("resolving vault path")?;
    let vault = VaultContext::open(&root, cli.api_key)?;
    tracing::debug!(vault = %vault.root.display(), "opened vault");

    command_handlers::dispatch::dispatch(cli.command, &vault, &settings)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

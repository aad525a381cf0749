use crate::platform::{Arch, Platform};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    name = "vaultmcp",
    about = "Install and manage the Obsidian MCP tools server for desktop AI hosts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault root (defaults to the current directory)
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    /// Settings file (defaults to <config dir>/vaultmcp/settings.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Local REST API key; otherwise OBSIDIAN_API_KEY or the plugin's stored key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Target platform override (windows|macos|linux)
    #[arg(long, global = true)]
    pub platform: Option<Platform>,

    /// Target architecture override (x64|arm64)
    #[arg(long, global = true)]
    pub arch: Option<Arch>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the server binary for this vault and register it with the desktop host
    Install,
    /// Report whether the server is installed and up to date
    Status {
        /// Emit the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the server binary and its desktop host entry
    Uninstall,
    /// Show the resolved install and host config locations
    Paths,
}

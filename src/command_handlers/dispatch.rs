use crate::cli::Commands;
use crate::command_handlers::{install, paths, status, uninstall};
use crate::config::Settings;
use crate::vault::VaultContext;
use anyhow::Result;

pub fn dispatch(cmd: Commands, vault: &VaultContext, settings: &Settings) -> Result<()> {
    match cmd {
        Commands::Install => install::run_install(vault, settings),
        Commands::Status { json } => status::print_status(vault, settings, json),
        Commands::Uninstall => uninstall::run_uninstall(vault, settings),
        Commands::Paths => paths::print_paths(vault, settings),
    }
}

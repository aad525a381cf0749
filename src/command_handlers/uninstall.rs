use crate::config::Settings;
use crate::installer;
use crate::vault::VaultContext;
use anyhow::{Context, Result};

pub fn run_uninstall(vault: &VaultContext, settings: &Settings) -> Result<()> {
    let report = installer::uninstall(vault, settings)
        .context("uninstall failed; check permissions and retry")?;
    match (&report.removed_dir, &report.removed_binary) {
        (Some(dir), _) => println!("Removed {}", dir.display()),
        (None, Some(bin)) => println!("Removed {}", bin.display()),
        (None, None) => println!("No installed server found"),
    }
    if report.config_entry_removed {
        println!("Removed host config entry from {}", report.config_path.display());
    } else {
        println!("No host config entry in {}", report.config_path.display());
    }
    Ok(())
}

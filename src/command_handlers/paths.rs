use crate::config::Settings;
use crate::installer::config_path;
use crate::paths::install_path;
use crate::platform::{arch, platform};
use crate::vault::VaultContext;
use anyhow::Result;

pub fn print_paths(vault: &VaultContext, settings: &Settings) -> Result<()> {
    let target = platform(settings);
    let info = install_path(&vault.root, target, settings)?;
    println!("platform: {target}-{}", arch(settings));
    println!("install dir: {}", info.directory.display());
    println!("executable: {}", info.executable_path.display());
    if let Some(from) = &info.symlinked_from {
        println!("resolved from: {}", from.display());
    }
    println!("host config: {}", config_path(settings, target)?.display());
    Ok(())
}

use crate::config::Settings;
use crate::host_config::{self, SERVER_ID};
use crate::installer::config_path;
use crate::platform::platform;
use crate::status::{installation_status, InstallState};
use crate::vault::VaultContext;
use crate::versioning::BinaryVersionProbe;
use anyhow::{Context, Result};
use std::path::Path;

pub fn print_status(vault: &VaultContext, settings: &Settings, json: bool) -> Result<()> {
    let probe = BinaryVersionProbe {
        timeout: settings.version_timeout,
    };
    let status = installation_status(vault, settings, &probe);

    if json {
        println!("{}", serde_json::to_string_pretty(&status).context("serializing status")?);
        return Ok(());
    }

    println!("state: {}", status.state);
    if let Some(v) = &status.plugin_version {
        println!("plugin version: {v}");
    }
    if let Some(v) = &status.server_version {
        println!("server version: {v}");
    }
    if let Some(info) = &status.install_path {
        println!("executable: {}", info.executable_path.display());
    }
    let config_readable = match config_path(settings, platform(settings)) {
        Ok(path) => {
            let (line, readable) = host_config_line(&path);
            println!("{line}");
            readable
        }
        Err(e) => {
            println!("host config: unavailable ({e})");
            true
        }
    };
    if let Some(err) = &status.error {
        println!("error: {err}");
    }
    if !config_readable {
        println!("Next: fix the host config by hand; vaultmcp will not overwrite it.");
        return Ok(());
    }
    match status.state {
        InstallState::NoApiKey => println!("Next: enable the Local REST API plugin in Obsidian, or pass --api-key."),
        InstallState::NotInstalled => println!("Next: run `vaultmcp install`."),
        InstallState::Outdated => println!("Next: run `vaultmcp install` to update the server."),
        InstallState::Error => println!("Next: reinstall with `vaultmcp install`; use -v for details."),
        InstallState::Installed => {}
    }
    Ok(())
}

/// Status line for the host config, and whether the file could be read.
fn host_config_line(path: &Path) -> (String, bool) {
    let (state, readable) = match host_config::server_entry(path, SERVER_ID) {
        Ok(Some(_)) => ("registered".to_string(), true),
        Ok(None) => ("not registered".to_string(), true),
        Err(e) => (format!("unreadable: {e}"), false),
    };
    (format!("host config: {} ({state})", path.display()), readable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_config::{upsert, LaunchEntry};

    #[test]
    fn host_config_line_distinguishes_unreadable_from_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claude_desktop_config.json");
        let (line, readable) = host_config_line(&path);
        assert!(line.ends_with("(not registered)") && readable, "{line}");

        upsert(&path, SERVER_ID, &LaunchEntry {
            command: "mcp-server".into(),
            args: Vec::new(),
            env: Default::default(),
        })
        .unwrap();
        assert!(host_config_line(&path).0.ends_with("(registered)"));

        std::fs::write(&path, "{ \"mcpServers\": ").unwrap();
        let (line, readable) = host_config_line(&path);
        assert!(line.contains("(unreadable: malformed host config"), "{line}");
        assert!(!readable);
    }
}

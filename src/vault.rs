use crate::error::{Error, Result};
use crate::paths::{PLUGIN_ID, VAULT_CONFIG_DIR};
use fs_err as fs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const REST_API_PLUGIN_ID: &str = "obsidian-local-rest-api";
pub const API_KEY_ENV: &str = "OBSIDIAN_API_KEY";

/// What we know about the vault the server is installed for.
#[derive(Debug, Clone)]
pub struct VaultContext {
    pub root: PathBuf,
    /// Raw version string; parsed (and possibly rejected) by the status check.
    pub plugin_version: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PluginManifest {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestApiData {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

impl VaultContext {
    /// Open `root` as a vault. `api_key` is an explicit key that takes precedence over
    /// the environment and the REST API plugin's stored settings.
    pub fn open(root: &Path, api_key: Option<String>) -> Result<Self> {
        if !root.join(VAULT_CONFIG_DIR).is_dir() {
            return Err(Error::NotAVault(root.to_path_buf()));
        }
        let api_key = non_empty(api_key)
            .or_else(|| non_empty(std::env::var(API_KEY_ENV).ok()))
            .or_else(|| stored_api_key(root));
        Ok(VaultContext {
            root: root.to_path_buf(),
            plugin_version: plugin_version(root),
            api_key,
        })
    }
}

fn plugin_dir(root: &Path, id: &str) -> PathBuf {
    root.join(VAULT_CONFIG_DIR).join("plugins").join(id)
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Version from the plugin manifest, or our own version when no manifest exists.
/// A manifest that cannot be read yields `None`, which the status check reports.
fn plugin_version(root: &Path) -> Option<String> {
    let manifest = plugin_dir(root, PLUGIN_ID).join("manifest.json");
    if !manifest.exists() {
        return Some(env!("CARGO_PKG_VERSION").to_string());
    }
    let parsed = fs::read_to_string(&manifest)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<PluginManifest>(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(m) => m.version,
        Err(e) => {
            tracing::warn!(path = %manifest.display(), error = %e, "unreadable plugin manifest");
            None
        }
    }
}

fn stored_api_key(root: &Path) -> Option<String> {
    let data = plugin_dir(root, REST_API_PLUGIN_ID).join("data.json");
    let contents = fs::read_to_string(&data).ok()?;
    match serde_json::from_str::<RestApiData>(&contents) {
        Ok(d) => non_empty(d.api_key),
        Err(e) => {
            tracing::warn!(path = %data.display(), error = %e, "unreadable REST API settings");
            None
        }
    }
}

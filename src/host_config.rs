//! Desktop host launcher config (`claude_desktop_config.json`).
//!
//! The file is shared with every other MCP server the user has configured. Only our
//! entry under `mcpServers` is touched; a document we cannot parse is an error rather
//! than something to overwrite.

use crate::error::{Error, Result};
use crate::platform::Platform;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const SERVER_ID: &str = "obsidian-mcp-tools";
const SERVERS_KEY: &str = "mcpServers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchEntry {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Location of the host config for `platform`, expanded against the current
/// environment on every call.
pub fn host_config_path(platform: Platform) -> Result<PathBuf> {
    expand_tokens(platform.host_config_template()).map(PathBuf::from)
}

/// Expand a leading `~` and any `%VAR%` tokens.
pub fn expand_tokens(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    if rest == "~" || rest.starts_with("~/") || rest.starts_with("~\\") {
        let home = dirs::home_dir().ok_or(Error::MissingLocation("home directory"))?;
        out.push_str(&home.to_string_lossy());
        rest = &rest[1..];
    }
    while let Some(start) = rest.find('%') {
        let Some(len) = rest[start + 1..].find('%') else {
            break;
        };
        let name = &rest[start + 1..start + 1 + len];
        out.push_str(&rest[..start]);
        if name.is_empty() {
            out.push('%');
        } else {
            let value = std::env::var(name).map_err(|_| Error::UnsetVariable(name.to_string()))?;
            out.push_str(&value);
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Insert or replace `server_id`, leaving every other key in the document as it was.
pub fn upsert(config_path: &Path, server_id: &str, entry: &LaunchEntry) -> Result<()> {
    let mut doc = read_document(config_path)?;
    let servers = servers_mut(&mut doc, config_path)?;
    let value = serde_json::to_value(entry).map_err(|e| Error::MalformedConfig {
        path: config_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    servers.insert(server_id.to_string(), value);
    write_document(config_path, &doc)?;
    tracing::info!(path = %config_path.display(), server_id, "host config entry written");
    Ok(())
}

/// Remove `server_id`. Returns whether anything was removed; a missing file or key is
/// not an error and leaves the file untouched.
pub fn remove(config_path: &Path, server_id: &str) -> Result<bool> {
    if !config_path.exists() {
        return Ok(false);
    }
    let mut doc = read_document(config_path)?;
    let removed = match doc.get_mut(SERVERS_KEY) {
        None => false,
        Some(Value::Object(servers)) => servers.shift_remove(server_id).is_some(),
        Some(_) => return Err(not_an_object(config_path, SERVERS_KEY)),
    };
    if removed {
        write_document(config_path, &doc)?;
        tracing::info!(path = %config_path.display(), server_id, "host config entry removed");
    }
    Ok(removed)
}

/// Current entry for `server_id`, if the file and entry exist.
pub fn server_entry(config_path: &Path, server_id: &str) -> Result<Option<LaunchEntry>> {
    if !config_path.exists() {
        return Ok(None);
    }
    let doc = read_document(config_path)?;
    let Some(entry) = doc.get(SERVERS_KEY).and_then(|s| s.get(server_id)) else {
        return Ok(None);
    };
    serde_json::from_value(entry.clone())
        .map(Some)
        .map_err(|e| Error::MalformedConfig {
            path: config_path.to_path_buf(),
            reason: format!("{server_id}: {e}"),
        })
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(Error::fs("reading", path, e)),
    };
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(&contents) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(Error::MalformedConfig {
            path: path.to_path_buf(),
            reason: "top level is not a JSON object".into(),
        }),
        Err(e) => Err(Error::MalformedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn servers_mut<'a>(doc: &'a mut Map<String, Value>, path: &Path) -> Result<&'a mut Map<String, Value>> {
    match doc
        .entry(SERVERS_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(servers) => Ok(servers),
        _ => Err(not_an_object(path, SERVERS_KEY)),
    }
}

fn not_an_object(path: &Path, key: &str) -> Error {
    Error::MalformedConfig {
        path: path.to_path_buf(),
        reason: format!("\"{key}\" is not a JSON object"),
    }
}

/// Replace the file in one rename so readers never see a partial document. A symlinked
/// config is written through to its target, keeping the target's permissions.
fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<()> {
    let target = write_target(path)?;
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| Error::fs("creating", &parent, e))?;
    let mut contents = serde_json::to_string_pretty(doc).map_err(|e| Error::MalformedConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    contents.push('\n');

    let mut tmp = tempfile::Builder::new()
        .prefix(".claude_desktop_config")
        .tempfile_in(&parent)
        .map_err(|e| Error::fs("creating temp file in", &parent, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| Error::fs("writing", tmp.path().to_path_buf(), e))?;
    match fs::metadata(&target) {
        Ok(meta) => tmp
            .as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| Error::fs("copying permissions to", tmp.path().to_path_buf(), e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::fs("reading metadata of", &target, e)),
    }
    tmp.persist(&target)
        .map_err(|e| Error::fs("replacing", &target, e.error))?;
    if target != path {
        tracing::debug!(link = %path.display(), target = %target.display(), "wrote through symlink");
    }
    Ok(())
}

// The file the rename must land on: the symlink's target when `path` is a link.
fn write_target(path: &Path) -> Result<PathBuf> {
    match dunce::canonicalize(path) {
        Ok(real) => Ok(real),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let is_link = fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink());
            if !is_link {
                return Ok(path.to_path_buf());
            }
            // dangling link: create the file it points at
            let dest = fs::read_link(path).map_err(|e| Error::fs("reading link", path, e))?;
            Ok(match path.parent() {
                Some(parent) if dest.is_relative() => parent.join(dest),
                _ => dest,
            })
        }
        Err(e) => Err(Error::fs("resolving", path, e)),
    }
}

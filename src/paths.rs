//! Install path resolution.
//!
//! The install directory lives inside the vault, which users frequently reach through a
//! symlinked or cloud-mirrored home directory. Resolution follows symlinks for every
//! component that exists, appends the not-yet-created tail verbatim, and then collapses
//! repeated contiguous segment runs that the symlink walk can produce
//! (`/home/u/home/u/vault` -> `/home/u/vault`).
//!
//! The collapse is a heuristic: a directory legitimately named like its parent chain
//! (`/data/a/a`) is collapsed too. Because `x/x` and `x` must resolve alike for
//! every run `x`, some repeat-free paths whose segment names recur are shortened as
//! well (`/a/b/c/b/a/b/c` -> `/a/b/c`).

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::platform::Platform;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::hash::Hash;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const PLUGIN_ID: &str = "mcp-tools";
pub const VAULT_CONFIG_DIR: &str = ".obsidian";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPathInfo {
    pub directory: PathBuf,
    pub executable_path: PathBuf,
    pub executable_name: String,
    /// Nominal path before resolution, when resolution changed it.
    pub symlinked_from: Option<PathBuf>,
}

/// Nominal install directory for `vault` before resolution.
pub fn default_install_dir(vault: &Path) -> PathBuf {
    vault
        .join(VAULT_CONFIG_DIR)
        .join("plugins")
        .join(PLUGIN_ID)
        .join("bin")
}

/// Compute where the server executable lives for this vault and platform.
pub fn install_path(vault: &Path, platform: Platform, settings: &Settings) -> Result<InstallPathInfo> {
    let (nominal_dir, executable_name) = match &settings.binary_path {
        Some(custom) => {
            let name = custom
                .file_name()
                .ok_or(Error::MissingLocation("executable name from binary_path"))?
                .to_string_lossy()
                .into_owned();
            let parent = custom
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (parent, name)
        }
        None => (
            default_install_dir(vault),
            platform.executable_name().to_string(),
        ),
    };
    let nominal_dir = absolutize(&nominal_dir)?;
    let directory = resolve(&nominal_dir)?;
    let symlinked_from = (directory != nominal_dir).then_some(nominal_dir);
    if let Some(from) = &symlinked_from {
        tracing::debug!(from = %from.display(), to = %directory.display(), "install path resolved");
    }
    Ok(InstallPathInfo {
        executable_path: directory.join(&executable_name),
        directory,
        executable_name,
        symlinked_from,
    })
}

fn absolutize(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| Error::fs("reading current dir", ".", e))?;
    Ok(cwd.join(p))
}

/// Resolve `nominal` to a symlink-free path with duplicate segment runs collapsed.
pub fn resolve(nominal: &Path) -> Result<PathBuf> {
    if nominal.as_os_str().is_empty() {
        return Ok(PathBuf::new());
    }
    let resolved = match dunce::canonicalize(nominal) {
        Ok(real) => real,
        Err(e) => {
            tracing::debug!(path = %nominal.display(), error = %e, "direct resolution failed, walking components");
            resolve_partial(nominal)?
        }
    };
    Ok(collapse_duplicate_segments(&resolved))
}

/// Walk `nominal` from the root, resolving each existing prefix. Everything from the
/// first missing component onward is appended as-is.
fn resolve_partial(nominal: &Path) -> Result<PathBuf> {
    let mut current = PathBuf::new();
    let components = nominal.components();
    let mut missing = false;

    for component in components {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                current.push(component.as_os_str());
                continue;
            }
            Component::CurDir => continue,
            Component::ParentDir if missing => {
                current.pop();
                continue;
            }
            _ => {}
        }
        if missing {
            current.push(component.as_os_str());
            continue;
        }
        let candidate = current.join(component.as_os_str());
        match dunce::canonicalize(&candidate) {
            Ok(real) => current = real,
            Err(e) if is_not_found(&e) => {
                missing = true;
                match component {
                    Component::ParentDir => {
                        current.pop();
                    }
                    _ => current.push(component.as_os_str()),
                }
            }
            Err(e) => return Err(Error::fs("resolving", candidate, e)),
        }
    }
    Ok(current)
}

fn is_not_found(e: &io::Error) -> bool {
    // a regular file in the prefix reports NotADirectory; the tail cannot exist either way
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Collapse repeated contiguous runs of path segments to a single occurrence.
/// The root marker (`/`, drive letter, UNC prefix) is kept exactly.
pub fn collapse_duplicate_segments(path: &Path) -> PathBuf {
    let mut root = PathBuf::new();
    let mut segments: Vec<OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => root.push(component.as_os_str()),
            other => segments.push(other.as_os_str().to_os_string()),
        }
    }

    let mut out = root;
    for segment in collapse_segments(&segments) {
        out.push(segment);
    }
    out
}

/// Canonical form of `segments` under `xx = x` for every run `x`, so inserting or
/// removing a repeat never changes the result.
///
/// Built from what all equivalent sequences share: the longest prefix `p` missing one
/// distinct segment plus the segment `a` completing it, and symmetrically the longest
/// suffix `q` plus the segment `b` before it. The result is the shortest sequence that
/// starts with `canon(p) a` and ends with `b canon(q)`. Sequences of distinct segments
/// come back unchanged.
pub fn collapse_segments<T: Eq + Hash + Clone>(segments: &[T]) -> Vec<T> {
    let mut memo = HashMap::new();
    canonical(segments, 0, segments.len(), &mut memo)
}

fn canonical<T: Eq + Hash + Clone>(
    segments: &[T],
    start: usize,
    end: usize,
    memo: &mut HashMap<(usize, usize), Vec<T>>,
) -> Vec<T> {
    if let Some(done) = memo.get(&(start, end)) {
        return done.clone();
    }
    let run = &segments[start..end];
    let distinct = run.iter().collect::<HashSet<_>>().len();
    let result = if distinct == run.len() {
        run.to_vec()
    } else if distinct == 1 {
        run[..1].to_vec()
    } else {
        let a = start + completing_index(run.iter(), distinct);
        let b = end - 1 - completing_index(run.iter().rev(), distinct);

        let mut head = canonical(segments, start, a, memo);
        head.push(segments[a].clone());
        let mut tail = vec![segments[b].clone()];
        tail.extend(canonical(segments, b + 1, end, memo));

        let overlap = (0..=head.len().min(tail.len()))
            .rev()
            .find(|&k| head[head.len() - k..] == tail[..k])
            .unwrap_or(0);
        head.extend_from_slice(&tail[overlap..]);
        head
    };
    memo.insert((start, end), result.clone());
    result
}

// Position at which `iter` has yielded `distinct` different segments.
fn completing_index<'a, T: Eq + Hash + 'a>(iter: impl Iterator<Item = &'a T>, distinct: usize) -> usize {
    let mut seen = HashSet::new();
    for (i, segment) in iter.enumerate() {
        seen.insert(segment);
        if seen.len() == distinct {
            return i;
        }
    }
    0
}

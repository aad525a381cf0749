pub fn platform_ops() -> &'static dyn PlatformOps {
    &ConcretePlatform
}

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::config::Settings;

/// Host filesystem operations that differ between unix and windows.
pub trait PlatformOps: Sync + Send {
    fn make_executable(&self, path: &Path) -> io::Result<()>;
    fn is_executable(&self, path: &Path) -> bool;
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::UNIX_PLATFORM as ConcretePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WINDOWS_PLATFORM as ConcretePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

/// Target platform: the settings override when present, otherwise the running OS.
pub fn platform(settings: &Settings) -> Platform {
    settings.platform.unwrap_or_else(detect_platform)
}

pub fn arch(settings: &Settings) -> Arch {
    settings.arch.unwrap_or_else(detect_arch)
}

pub fn detect_platform() -> Platform {
    platform_from_os(std::env::consts::OS)
}

pub fn detect_arch() -> Arch {
    arch_from_cpu(std::env::consts::ARCH)
}

fn platform_from_os(os: &str) -> Platform {
    match os {
        "windows" => Platform::Windows,
        "macos" => Platform::Macos,
        _ => Platform::Linux,
    }
}

fn arch_from_cpu(cpu: &str) -> Arch {
    match cpu {
        "aarch64" | "arm64" => Arch::Arm64,
        _ => Arch::X64,
    }
}

impl Platform {
    /// Name of the server executable inside the install directory.
    pub fn executable_name(self) -> &'static str {
        match self {
            Platform::Windows => "mcp-server.exe",
            _ => "mcp-server",
        }
    }

    /// Release asset to download for this platform/arch pair.
    pub fn asset_name(self, arch: Arch) -> String {
        match self {
            Platform::Windows => "mcp-server-windows.exe".to_string(),
            Platform::Macos => format!("mcp-server-macos-{arch}"),
            Platform::Linux => "mcp-server-linux".to_string(),
        }
    }

    /// Unexpanded location of the desktop host's launcher config.
    pub fn host_config_template(self) -> &'static str {
        match self {
            Platform::Windows => r"%APPDATA%\Claude\claude_desktop_config.json",
            Platform::Macos => "~/Library/Application Support/Claude/claude_desktop_config.json",
            Platform::Linux => "~/.config/Claude/claude_desktop_config.json",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win32" => Ok(Platform::Windows),
            "macos" | "mac" | "darwin" => Ok(Platform::Macos),
            "linux" => Ok(Platform::Linux),
            other => Err(format!("unknown platform '{other}' (expected windows, macos or linux)")),
        }
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!("unknown arch '{other}' (expected x64 or arm64)")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        };
        f.write_str(s)
    }
}

use crate::error::{Error, Result};
use crate::platform::{Arch, Platform};
use fs_err as fs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// User overrides, validated once when read. Every field is optional and wins over
/// auto-detected values when set.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub platform: Option<Platform>,
    pub arch: Option<Arch>,
    /// Full path of the server executable, replacing the vault-relative default.
    pub binary_path: Option<PathBuf>,
    /// Launch command written into the host config instead of the executable path.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub host: Option<String>,
    /// Release base URL. Supports {version}.
    pub download_base: Option<String>,
    /// Host launcher config location, replacing the per-platform default.
    pub host_config: Option<PathBuf>,
    pub version_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            platform: None,
            arch: None,
            binary_path: None,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            host: None,
            download_base: None,
            host_config: None,
            version_timeout: DEFAULT_VERSION_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    platform: Option<String>,
    arch: Option<String>,
    binary_path: Option<String>,
    command: Option<String>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    host: Option<String>,
    download_base: Option<String>,
    host_config: Option<String>,
    version_timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `explicit` (which must exist) or from the default location
    /// (which may be absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_settings_path() {
                Some(p) if p.is_file() => p,
                _ => return Ok(Settings::default()),
            },
        };
        let data = fs::read_to_string(&path).map_err(|e| Error::fs("reading settings", &path, e))?;
        tracing::debug!(path = %path.display(), "loaded settings file");
        Settings::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let raw: RawSettings =
            toml::from_str(data).map_err(|e| Error::InvalidSettings(e.message().to_string()))?;
        raw.validate()
    }

    /// Apply command-line overrides on top of file values.
    pub fn with_overrides(mut self, platform: Option<Platform>, arch: Option<Arch>) -> Self {
        if platform.is_some() {
            self.platform = platform;
        }
        if arch.is_some() {
            self.arch = arch;
        }
        self
    }
}

impl RawSettings {
    fn validate(self) -> Result<Settings> {
        let platform = non_empty(self.platform)
            .map(|s| s.parse::<Platform>())
            .transpose()
            .map_err(Error::InvalidSettings)?;
        let arch = non_empty(self.arch)
            .map(|s| s.parse::<Arch>())
            .transpose()
            .map_err(Error::InvalidSettings)?;
        let version_timeout = match self.version_timeout_secs {
            Some(0) => {
                return Err(Error::InvalidSettings(
                    "version_timeout_secs must be greater than zero".into(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_VERSION_TIMEOUT,
        };
        Ok(Settings {
            platform,
            arch,
            binary_path: non_empty(self.binary_path).map(PathBuf::from),
            command: non_empty(self.command),
            args: self.args,
            env: self.env,
            host: non_empty(self.host),
            download_base: non_empty(self.download_base),
            host_config: non_empty(self.host_config).map(PathBuf::from),
            version_timeout,
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vaultmcp").join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn parses_all_fields() {
        let s = Settings::from_toml_str(
            r#"
platform = "linux"
arch = "arm64"
binary_path = "/opt/mcp/mcp-server"
command = "wsl.exe"
args = ["--", "/opt/mcp/mcp-server"]
host = "127.0.0.1"
download_base = "https://example.test/{version}"
host_config = "/tmp/claude.json"
version_timeout_secs = 2

[env]
LOG_LEVEL = "debug"
"#,
        )
        .unwrap();
        assert_eq!(s.platform, Some(Platform::Linux));
        assert_eq!(s.arch, Some(Arch::Arm64));
        assert_eq!(s.binary_path, Some(PathBuf::from("/opt/mcp/mcp-server")));
        assert_eq!(s.command.as_deref(), Some("wsl.exe"));
        assert_eq!(s.args, vec!["--", "/opt/mcp/mcp-server"]);
        assert_eq!(s.env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(s.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(s.host_config, Some(PathBuf::from("/tmp/claude.json")));
        assert_eq!(s.version_timeout, Duration::from_secs(2));
    }

    #[test]
    fn empty_strings_are_absent() {
        let s = Settings::from_toml_str("platform = \"\"\ncommand = \"  \"").unwrap();
        assert_eq!(s.platform, None);
        assert_eq!(s.command, None);
    }

    #[test]
    fn rejects_unknown_platform_and_zero_timeout() {
        assert!(matches!(
            Settings::from_toml_str("platform = \"beos\""),
            Err(Error::InvalidSettings(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("version_timeout_secs = 0"),
            Err(Error::InvalidSettings(_))
        ));
        assert!(Settings::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn cli_overrides_win() {
        let s = Settings::from_toml_str("platform = \"macos\"")
            .unwrap()
            .with_overrides(Some(Platform::Windows), None);
        assert_eq!(s.platform, Some(Platform::Windows));
        assert_eq!(s.arch, None);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Fs { .. }));
    }
}

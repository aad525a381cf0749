use crate::config::Settings;
use crate::download::{Download, DownloadProgress};
use crate::error::{Error, Result};
use crate::host_config::{self, host_config_path, LaunchEntry, SERVER_ID};
use crate::paths::{install_path, InstallPathInfo};
use crate::platform::{arch, platform, Arch, Platform};
use crate::vault::VaultContext;
use crate::versioning::parse_version;
use fs_err as fs;
use reqwest::blocking::Client;
use semver::Version;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_DOWNLOAD_BASE: &str =
    "https://github.com/jacksteamdev/obsidian-mcp-tools/releases/download/{version}";

#[derive(Debug)]
pub struct InstallReport {
    pub install_path: InstallPathInfo,
    pub config_path: PathBuf,
    pub url: String,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct UninstallReport {
    pub removed_binary: Option<PathBuf>,
    pub removed_dir: Option<PathBuf>,
    pub config_path: PathBuf,
    pub config_entry_removed: bool,
}

// Expand the release template into the asset URL for this platform
pub fn download_url(settings: &Settings, version: &Version, platform: Platform, arch: Arch) -> String {
    let base = settings
        .download_base
        .as_deref()
        .unwrap_or(DEFAULT_DOWNLOAD_BASE)
        .replace("{version}", &version.to_string());
    format!("{}/{}", base.trim_end_matches('/'), platform.asset_name(arch))
}

pub fn config_path(settings: &Settings, platform: Platform) -> Result<PathBuf> {
    match &settings.host_config {
        Some(p) => Ok(p.clone()),
        None => host_config_path(platform),
    }
}

/// Host launcher entry for the installed server.
pub fn launch_entry(info: &InstallPathInfo, api_key: &str, settings: &Settings) -> LaunchEntry {
    let mut env = BTreeMap::new();
    env.insert("OBSIDIAN_API_KEY".to_string(), api_key.to_string());
    if let Some(host) = &settings.host {
        env.insert("OBSIDIAN_HOST".to_string(), host.clone());
    }
    env.extend(settings.env.clone());
    LaunchEntry {
        command: settings
            .command
            .clone()
            .unwrap_or_else(|| info.executable_path.to_string_lossy().into_owned()),
        args: settings.args.clone(),
        env,
    }
}

/// Create `dir` if missing; an existing directory must accept new files.
pub fn ensure_install_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return fs::create_dir_all(dir).map_err(|source| Error::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        });
    }
    match tempfile::Builder::new().prefix(".vaultmcp-probe").tempfile_in(dir) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(Error::DirectoryNotWritable(dir.to_path_buf()))
        }
        Err(e) => Err(Error::fs("probing", dir, e)),
    }
}

/// Download the server for this vault's plugin version and register it with the host.
pub fn install(
    vault: &VaultContext,
    settings: &Settings,
    client: &Client,
    on_progress: impl FnMut(&DownloadProgress),
) -> Result<InstallReport> {
    let version = parse_version(vault.plugin_version.as_deref().unwrap_or_default())?;
    let api_key = vault.api_key.as_deref().ok_or(Error::NoApiKey)?;
    let (platform, arch) = (platform(settings), arch(settings));

    let info = install_path(&vault.root, platform, settings)?;
    ensure_install_dir(&info.directory)?;

    let url = download_url(settings, &version, platform, arch);
    info!(%url, dest = %info.executable_path.display(), %platform, %arch, "installing server");
    let done = Download::start(client.clone(), url.clone(), &info.executable_path).wait(on_progress)?;

    let config_path = config_path(settings, platform)?;
    host_config::upsert(&config_path, SERVER_ID, &launch_entry(&info, api_key, settings))?;

    Ok(InstallReport {
        install_path: info,
        config_path,
        url,
        bytes: done.bytes_received,
    })
}

/// Remove the server binary and its host config entry. Pieces already gone are skipped.
pub fn uninstall(vault: &VaultContext, settings: &Settings) -> Result<UninstallReport> {
    let platform = platform(settings);
    let info = install_path(&vault.root, platform, settings)?;

    let mut removed_binary = None;
    let mut removed_dir = None;
    if settings.binary_path.is_none() && info.directory.is_dir() {
        fs::remove_dir_all(&info.directory).map_err(|e| Error::fs("removing", &info.directory, e))?;
        removed_dir = Some(info.directory.clone());
    } else if info.executable_path.exists() {
        fs::remove_file(&info.executable_path)
            .map_err(|e| Error::fs("removing", &info.executable_path, e))?;
        removed_binary = Some(info.executable_path.clone());
    }

    let config_path = config_path(settings, platform)?;
    let config_entry_removed = host_config::remove(&config_path, SERVER_ID)?;
    if removed_dir.is_none() && removed_binary.is_none() {
        warn!(path = %info.executable_path.display(), "no installed server found");
    }
    Ok(UninstallReport {
        removed_binary,
        removed_dir,
        config_path,
        config_entry_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::http_client;
    use crate::paths::default_install_dir;

    struct Fixture {
        _tmp: tempfile::TempDir,
        vault: VaultContext,
        settings: Settings,
        config: PathBuf,
    }

    fn fixture(base_url: &str, api_key: Option<&str>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap().join("vault");
        std::fs::create_dir_all(root.join(".obsidian")).unwrap();
        let config = dunce::canonicalize(tmp.path()).unwrap().join("Claude").join("config.json");
        Fixture {
            vault: VaultContext {
                root,
                plugin_version: Some("0.2.27".into()),
                api_key: api_key.map(str::to_string),
            },
            settings: Settings {
                platform: Some(Platform::Linux),
                arch: Some(Arch::X64),
                download_base: Some(format!("{base_url}/{{version}}")),
                host_config: Some(config.clone()),
                host: Some("127.0.0.1".into()),
                ..Settings::default()
            },
            config,
            _tmp: tmp,
        }
    }

    #[test]
    fn builds_release_urls() {
        let v = Version::new(0, 2, 27);
        let s = Settings::default();
        assert_eq!(
            download_url(&s, &v, Platform::Macos, Arch::Arm64),
            "https://github.com/jacksteamdev/obsidian-mcp-tools/releases/download/0.2.27/mcp-server-macos-arm64"
        );
        let custom = Settings {
            download_base: Some("http://mirror.local/mcp/".into()),
            ..Settings::default()
        };
        assert_eq!(
            download_url(&custom, &v, Platform::Windows, Arch::X64),
            "http://mirror.local/mcp/mcp-server-windows.exe"
        );
    }

    #[test]
    fn launch_entry_merges_env_with_user_values_last() {
        let info = InstallPathInfo {
            directory: PathBuf::from("/v/bin"),
            executable_path: PathBuf::from("/v/bin/mcp-server"),
            executable_name: "mcp-server".into(),
            symlinked_from: None,
        };
        let settings = Settings {
            host: Some("10.0.0.2".into()),
            env: BTreeMap::from([
                ("OBSIDIAN_HOST".to_string(), "override".to_string()),
                ("EXTRA".to_string(), "1".to_string()),
            ]),
            ..Settings::default()
        };
        let e = launch_entry(&info, "key", &settings);
        assert_eq!(e.command, "/v/bin/mcp-server");
        assert_eq!(e.env["OBSIDIAN_API_KEY"], "key");
        assert_eq!(e.env["OBSIDIAN_HOST"], "override");
        assert_eq!(e.env["EXTRA"], "1");

        let wsl = Settings {
            command: Some("wsl.exe".into()),
            args: vec!["/v/bin/mcp-server".into()],
            ..Settings::default()
        };
        let e = launch_entry(&info, "key", &wsl);
        assert_eq!(e.command, "wsl.exe");
        assert_eq!(e.args, vec!["/v/bin/mcp-server"]);
    }

    #[test]
    fn install_downloads_and_registers_server() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/0.2.27/mcp-server-linux")
            .with_status(200)
            .with_body("#!/bin/sh\necho 0.2.27\n")
            .expect(1)
            .create();
        let f = fixture(&server.url(), Some("secret"));

        let mut events = 0;
        let report = install(&f.vault, &f.settings, &http_client().unwrap(), |_| events += 1).unwrap();

        m.assert();
        assert!(events > 0);
        let exe = default_install_dir(&f.vault.root).join("mcp-server");
        assert_eq!(report.install_path.executable_path, exe);
        assert!(exe.is_file());
        let entry = host_config::server_entry(&f.config, SERVER_ID).unwrap().unwrap();
        assert_eq!(entry.command, exe.to_string_lossy());
        assert_eq!(entry.env["OBSIDIAN_API_KEY"], "secret");
        assert_eq!(entry.env["OBSIDIAN_HOST"], "127.0.0.1");
    }

    #[test]
    fn install_without_api_key_makes_no_request() {
        let mut server = mockito::Server::new();
        let m = server.mock("GET", mockito::Matcher::Any).expect(0).create();
        let f = fixture(&server.url(), None);
        let err = install(&f.vault, &f.settings, &http_client().unwrap(), |_| {}).unwrap_err();
        assert!(matches!(err, Error::NoApiKey));
        m.assert();
    }

    #[test]
    fn failed_download_leaves_no_binary_and_no_config() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/0.2.27/mcp-server-linux").with_status(500).create();
        let f = fixture(&server.url(), Some("secret"));
        let err = install(&f.vault, &f.settings, &http_client().unwrap(), |_| {}).unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
        assert!(!default_install_dir(&f.vault.root).join("mcp-server").exists());
        assert!(!f.config.exists());
    }

    #[test]
    fn uninstall_removes_binary_dir_and_entry() {
        let f = fixture("http://unused.invalid", Some("secret"));
        let dir = default_install_dir(&f.vault.root);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("mcp-server"), "bin").unwrap();
        std::fs::create_dir_all(f.config.parent().unwrap()).unwrap();
        std::fs::write(
            &f.config,
            r#"{"mcpServers":{"obsidian-mcp-tools":{"command":"x"},"other":{"command":"y"}}}"#,
        )
        .unwrap();

        let report = uninstall(&f.vault, &f.settings).unwrap();

        assert_eq!(report.removed_dir, Some(dir.clone()));
        assert!(report.config_entry_removed);
        assert!(!dir.exists());
        assert!(host_config::server_entry(&f.config, "other").unwrap().is_some());

        let again = uninstall(&f.vault, &f.settings).unwrap();
        assert!(again.removed_dir.is_none() && again.removed_binary.is_none());
        assert!(!again.config_entry_removed);
    }

    #[test]
    fn create_failure_is_distinct_from_not_writable() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("plugins");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = ensure_install_dir(&blocker.join("mcp-tools").join("bin")).unwrap_err();
        assert!(matches!(err, Error::CreateDirectory { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn read_only_dir_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("bin");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // root ignores directory permissions
        if std::fs::write(dir.join("write-check"), "x").is_ok() {
            return;
        }
        let err = ensure_install_dir(&dir).unwrap_err();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(err, Error::DirectoryNotWritable(_)), "{err}");
    }
}

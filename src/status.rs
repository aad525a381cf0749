use crate::config::Settings;
use crate::paths::{install_path, InstallPathInfo};
use crate::platform::{platform, platform_ops};
use crate::vault::VaultContext;
use crate::versioning::{parse_version, VersionProbe};
use semver::Version;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallState {
    NoApiKey,
    NotInstalled,
    Installed,
    Outdated,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationStatus {
    pub state: InstallState,
    pub install_path: Option<InstallPathInfo>,
    pub plugin_version: Option<Version>,
    pub server_version: Option<Version>,
    pub error: Option<String>,
}

impl InstallationStatus {
    fn new(state: InstallState) -> Self {
        InstallationStatus {
            state,
            install_path: None,
            plugin_version: None,
            server_version: None,
            error: None,
        }
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        self.state = InstallState::Error;
        self.error = Some(message.into());
        self
    }
}

/// Compute the installation state from scratch. Never errors: every failure is folded
/// into [`InstallState::Error`] with a message.
pub fn installation_status(
    vault: &VaultContext,
    settings: &Settings,
    probe: &dyn VersionProbe,
) -> InstallationStatus {
    let mut status = InstallationStatus::new(InstallState::Error);

    let raw_version = vault.plugin_version.as_deref().unwrap_or_default();
    match parse_version(raw_version) {
        Ok(v) => status.plugin_version = Some(v),
        Err(e) => return status.failed(format!("plugin version is unusable: {e}")),
    }

    if vault.api_key.is_none() {
        status.state = InstallState::NoApiKey;
        return status;
    }

    let info = match install_path(&vault.root, platform(settings), settings) {
        Ok(info) => info,
        Err(e) => return status.failed(format!("cannot determine install path: {e}")),
    };
    let executable = info.executable_path.clone();
    status.install_path = Some(info);

    if !platform_ops().is_executable(&executable) {
        status.state = InstallState::NotInstalled;
        return status;
    }

    let server = match probe.server_version(&executable) {
        Ok(v) => v,
        Err(e) => return status.failed(e.to_string()),
    };
    let outdated = status.plugin_version.as_ref().is_some_and(|plugin| server < *plugin);
    status.server_version = Some(server);
    status.state = if outdated {
        InstallState::Outdated
    } else {
        InstallState::Installed
    };
    tracing::debug!(state = %status.state, "installation status");
    status
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallState::NoApiKey => "no-api-key",
            InstallState::NotInstalled => "not-installed",
            InstallState::Installed => "installed",
            InstallState::Outdated => "outdated",
            InstallState::Error => "error",
        };
        f.write_str(s)
    }
}

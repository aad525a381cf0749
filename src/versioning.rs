use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

static VERSION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[vV]?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)")
        .expect("version pattern is valid")
});

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Parse a semantic version, tolerating a leading `v` and surrounding whitespace.
pub fn parse_version(text: &str) -> Result<Version> {
    let trimmed = text.trim();
    let bare = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| Error::MalformedVersion {
        text: text.to_string(),
        reason: e.to_string(),
    })
}

/// First semver-looking token in `output`.
fn extract_version(output: &str) -> Option<Version> {
    VERSION_TOKEN
        .captures_iter(output)
        .find_map(|cap| Version::parse(&cap[1]).ok())
}

/// Source of the installed server's version.
pub trait VersionProbe {
    fn server_version(&self, executable: &Path) -> Result<Version>;
}

/// Runs `<executable> --version` with a bounded wait.
pub struct BinaryVersionProbe {
    pub timeout: Duration,
}

impl VersionProbe for BinaryVersionProbe {
    fn server_version(&self, executable: &Path) -> Result<Version> {
        query_server_version(executable, self.timeout)
    }
}

pub fn query_server_version(executable: &Path, timeout: Duration) -> Result<Version> {
    let failure = |reason: String| Error::VersionQuery {
        path: executable.to_path_buf(),
        reason,
    };
    let mut child = Command::new(executable)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| failure(format!("could not start: {e}")))?;

    // drain stdout on a side thread so a chatty binary cannot block on a full pipe
    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_string(&mut buf);
        }
        buf
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(failure(format!("timed out after {}ms", timeout.as_millis())));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(failure(format!("waiting: {e}"))),
        }
    };
    let output = reader.join().unwrap_or_default();

    if !status.success() {
        return Err(failure(format!("exited with {status}")));
    }
    let version = extract_version(&output)
        .ok_or_else(|| failure(format!("no version in output {:?}", output.trim())))?;
    tracing::debug!(path = %executable.display(), %version, "server version");
    Ok(version)
}

use crate::platform::PlatformOps;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub static UNIX_PLATFORM: Unix = Unix;

pub struct Unix;

impl PlatformOps for Unix {
    fn make_executable(&self, path: &Path) -> io::Result<()> {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)
    }
    fn is_executable(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
}

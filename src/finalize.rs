//! Final permission fix-up.

use std::fs;
use std::io;
use std::path::Path;

/// Add the owner, group and other execute bits, keeping every other bit.
///
/// Returns the resulting mode.
#[cfg(unix)]
pub fn mark_executable(artifact: &Path) -> io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(artifact)?.permissions();
    let mode = permissions.mode() | 0o111;
    permissions.set_mode(mode);
    fs::set_permissions(artifact, permissions)?;
    Ok(mode)
}

/// Execute bits do not exist here; only checks that the artifact exists.
#[cfg(not(unix))]
pub fn mark_executable(artifact: &Path) -> io::Result<u32> {
    fs::metadata(artifact)?;
    Ok(0)
}

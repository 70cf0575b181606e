//! Host files copied into a freshly extracted rootfs.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Mode given to injected executables.
const TOOL_MODE: u32 = 0o755;

/// Copies the host resolver configuration to `<rootfs>/etc/resolv.conf`.
///
/// `etc/` is created when the image lacks it. Base images often ship
/// `resolv.conf` as a symlink; it is removed first so the copy can never be
/// written through a link pointing back at the host.
///
/// # Errors
///
/// Returns the underlying I/O error, or `PermissionDenied` if `etc` resolves
/// outside the rootfs; callers treat it as a warning.
pub fn inject_resolv_conf(rootfs: &Path, host_resolv: &Path) -> std::io::Result<PathBuf> {
    let dest = install_path(rootfs, Path::new(burrow_common::constants::ROOTFS_RESOLV_CONF))?;
    remove_symlink(&dest)?;
    let _ = std::fs::copy(host_resolv, &dest)?;
    Ok(dest)
}

/// Copies an executable into `<rootfs>/usr/local/bin` and marks it 0755.
///
/// # Errors
///
/// Returns the underlying I/O error, or `PermissionDenied` if the install
/// directory resolves outside the rootfs; callers decide whether it is fatal.
pub fn inject_tool(rootfs: &Path, source: &Path) -> std::io::Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;
    let dest = install_path(
        rootfs,
        &Path::new(burrow_common::constants::TOOL_INSTALL_DIR).join(name),
    )?;
    remove_symlink(&dest)?;
    let _ = std::fs::copy(source, &dest)?;
    std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(TOOL_MODE))?;
    Ok(dest)
}

/// Resolves `relative` inside `rootfs`, creating its parent directories.
fn install_path(rootfs: &Path, relative: &Path) -> std::io::Result<PathBuf> {
    let (Some(parent), Some(name)) = (relative.parent(), relative.file_name()) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", relative.display()),
        ));
    };
    let dir = crate::layer::confined_dir(rootfs, parent)?.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("{} resolves outside the rootfs", parent.display()),
        )
    })?;
    Ok(dir.join(name))
}

fn remove_symlink(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => std::fs::remove_file(path),
        _ => Ok(()),
    }
}

//! Root filesystem switching via `chroot(2)`.
//!
//! The rootfs is a plain directory rather than a mount point, so
//! `pivot_root(2)` does not apply; the private mount namespace keeps the
//! old root's mounts out of reach of the host instead.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::LaunchStage;

/// Changes the filesystem root to `new_root` and moves into it.
///
/// # Errors
///
/// Returns a `Namespace` error labeled `chroot` if `chroot(2)` or the
/// following `chdir("/")` fails.
#[cfg(target_os = "linux")]
pub fn enter_root(new_root: &Path) -> Result<()> {
    nix::unistd::chroot(new_root).map_err(|e| {
        BurrowError::namespace(LaunchStage::Chroot, format!("{}: {e}", new_root.display()))
    })?;
    nix::unistd::chdir("/").map_err(|e| BurrowError::namespace(LaunchStage::Chroot, e))?;
    tracing::debug!(new_root = %new_root.display(), "changed root");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; chroot isolation is only supported on Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_root(_new_root: &Path) -> Result<()> {
    Err(BurrowError::namespace(
        LaunchStage::Chroot,
        "Linux required for native container operations",
    ))
}

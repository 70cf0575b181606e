//! Mount namespace isolation.
//!
//! A fresh mount namespace starts as a copy of the host's, and with shared
//! propagation any mount made inside would show up on the host as well.

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::LaunchStage;

/// Recursively marks every inherited mount as private.
///
/// Must run before any other mount inside the new namespace.
///
/// # Errors
///
/// Returns a `Namespace` error labeled `make-private` if `mount(2)` fails.
#[cfg(target_os = "linux")]
pub fn make_mounts_private() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| BurrowError::namespace(LaunchStage::MakePrivate, e))?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_mounts_private() -> Result<()> {
    Err(BurrowError::namespace(
        LaunchStage::MakePrivate,
        "Linux required for native container operations",
    ))
}

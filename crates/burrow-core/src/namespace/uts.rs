//! UTS namespace isolation.
//!
//! Gives the container its own hostname.

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Hostname, LaunchStage};

/// Sets the hostname inside the UTS namespace.
///
/// # Errors
///
/// Returns a `Namespace` error labeled `sethostname` if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(hostname: &Hostname) -> Result<()> {
    nix::unistd::sethostname(hostname.as_str())
        .map_err(|e| BurrowError::namespace(LaunchStage::Sethostname, e))?;
    tracing::debug!(hostname = %hostname, "container hostname set");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_hostname: &Hostname) -> Result<()> {
    Err(BurrowError::namespace(
        LaunchStage::Sethostname,
        "Linux required for native container operations",
    ))
}

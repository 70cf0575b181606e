//! Pseudo-filesystem mounts inside the container root.
//!
//! `/proc` comes first so that process tools see the new PID namespace;
//! `/sys` and `/dev` follow.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::LaunchStage;

/// A kernel pseudo-filesystem mounted into every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoFilesystem {
    /// Process information (`proc`).
    Proc,
    /// System information (`sysfs`).
    Sys,
    /// Device nodes (`devtmpfs`).
    Dev,
}

impl PseudoFilesystem {
    /// Mount order inside a new root.
    pub const MOUNT_ORDER: [Self; 3] = [Self::Proc, Self::Sys, Self::Dev];

    /// Mount source name.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Sys => "sys",
            Self::Dev => "udev",
        }
    }

    /// Filesystem type passed to `mount(2)`.
    #[must_use]
    pub const fn fstype(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Sys => "sysfs",
            Self::Dev => "devtmpfs",
        }
    }

    /// Absolute mount point inside the container.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Proc => "/proc",
            Self::Sys => "/sys",
            Self::Dev => "/dev",
        }
    }

    fn stage(self) -> LaunchStage {
        LaunchStage::Mount(self.target().to_string())
    }
}

/// Mounts `/proc`, `/sys` and `/dev` in order, relative to the current root.
///
/// Call after the root has been changed; missing mount points are created.
///
/// # Errors
///
/// Returns a `Namespace` error labeled with the failing mount target.
pub fn mount_essential_filesystems() -> Result<()> {
    for fs in PseudoFilesystem::MOUNT_ORDER {
        mount_pseudo(fs, Path::new(fs.target()))?;
    }
    Ok(())
}

/// Mounts one pseudo-filesystem at `target`.
///
/// # Errors
///
/// Returns a `Namespace` error if the mount point cannot be created or the
/// `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_pseudo(fs: PseudoFilesystem, target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    std::fs::create_dir_all(target).map_err(|e| BurrowError::namespace(fs.stage(), e))?;

    let flags = match fs {
        PseudoFilesystem::Proc | PseudoFilesystem::Sys => {
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV
        }
        PseudoFilesystem::Dev => MsFlags::MS_NOSUID,
    };
    mount(
        Some(fs.source()),
        target,
        Some(fs.fstype()),
        flags,
        None::<&str>,
    )
    .map_err(|e| BurrowError::namespace(fs.stage(), e))?;

    tracing::debug!(target = %target.display(), fstype = fs.fstype(), "pseudo-filesystem mounted");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; pseudo-filesystems require Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_pseudo(fs: PseudoFilesystem, _target: &Path) -> Result<()> {
    Err(BurrowError::namespace(
        fs.stage(),
        "Linux required for native container operations",
    ))
}

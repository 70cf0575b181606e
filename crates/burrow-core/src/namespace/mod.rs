//! Linux namespace management for container isolation.
//!
//! The container gets fresh UTS, PID, mount and network namespaces,
//! requested together through a single `unshare(2)` call.

pub mod mount;
pub mod uts;

use burrow_common::error::Result;

/// Which namespaces to create for a new container.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate the hostname.
    pub uts: bool,
    /// Give the container its own PID space; the next child becomes PID 1.
    pub pid: bool,
    /// Private mount table.
    pub mount: bool,
    /// Private network stack (loopback only).
    pub network: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network: true,
        }
    }
}

#[cfg(target_os = "linux")]
impl NamespaceSet {
    /// Clone flags for this set.
    #[must_use]
    pub fn clone_flags(&self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        let mut flags = CloneFlags::empty();
        flags.set(CloneFlags::CLONE_NEWUTS, self.uts);
        flags.set(CloneFlags::CLONE_NEWPID, self.pid);
        flags.set(CloneFlags::CLONE_NEWNS, self.mount);
        flags.set(CloneFlags::CLONE_NEWNET, self.network);
        flags
    }

    /// Moves the calling process into new namespaces with one `unshare(2)`.
    ///
    /// The PID namespace only applies to children forked afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `Namespace` error labeled `unshare` if the syscall fails.
    pub fn enter(&self) -> Result<()> {
        use burrow_common::error::BurrowError;
        use burrow_common::types::LaunchStage;

        nix::sched::unshare(self.clone_flags())
            .map_err(|e| BurrowError::namespace(LaunchStage::Unshare, e))?;
        tracing::debug!(namespaces = ?self, "namespaces created");
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl NamespaceSet {
    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error; namespaces require Linux.
    pub fn enter(&self) -> Result<()> {
        Err(burrow_common::error::BurrowError::Config {
            message: "Linux required for native container operations".into(),
        })
    }
}

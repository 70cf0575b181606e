//! Core container struct and lifecycle operations.
//!
//! A launch runs strictly in order: privilege check, rootfs provisioning,
//! resource boundary, supervised namespace launch, teardown. The boundary
//! is released on every path once it exists.

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerSpec, ContainerState};
use burrow_core::cgroup::{ResourceBoundary, ResourceLimiter};
use burrow_image::provision::{Provisioner, RootfsInstance};

use crate::process::{self, ExitOutcome, LaunchPlan};

/// A container instance with its configuration and runtime state.
#[derive(Debug)]
pub struct Container {
    spec: ContainerSpec,
    config: RuntimeConfig,
    state: ContainerState,
}

impl Container {
    /// Creates a new container in the `Created` state.
    #[must_use]
    pub const fn new(spec: ContainerSpec, config: RuntimeConfig) -> Self {
        Self {
            spec,
            config,
            state: ContainerState::Created,
        }
    }

    /// Launch request this container was built from.
    #[must_use]
    pub const fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Runs the container to completion.
    ///
    /// Blocks while the shell is interactive and returns how it ended.
    /// The resource boundary, if any, has been torn down by the time this
    /// returns, whether it returns `Ok` or `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container was already launched, the caller
    /// is not root, or any provisioning, limit or namespace step fails.
    pub fn launch(&mut self) -> Result<ExitOutcome> {
        if self.state != ContainerState::Created {
            return Err(BurrowError::Config {
                message: format!(
                    "container {} is already {}",
                    self.spec.instance_id(),
                    self.state
                ),
            });
        }

        let result = self.run();
        match &result {
            Ok(outcome) => {
                tracing::info!(code = outcome.code(), "container exited");
                self.transition(ContainerState::Stopped);
            }
            Err(e) => {
                tracing::error!(error = %e, "container launch failed");
                self.transition(ContainerState::Failed);
            }
        }
        result
    }

    fn run(&mut self) -> Result<ExitOutcome> {
        self.config.validate()?;
        require_root()?;

        let (rootfs, boundary) = self.prepare()?;

        self.transition(ContainerState::Running);
        let outcome = process::supervise(&LaunchPlan {
            hostname: self.spec.hostname(),
            rootfs: rootfs.path(),
            shell: &self.config.shell,
            boundary: boundary.as_ref(),
        });

        if let Some(boundary) = boundary {
            let _ = boundary.release();
        }
        self.dispose_rootfs(rootfs);
        outcome
    }

    /// Provisions the rootfs, then the resource boundary. A rootfs whose
    /// boundary cannot be established is disposed of before returning.
    fn prepare(&self) -> Result<(RootfsInstance, Option<ResourceBoundary>)> {
        let instance = self.spec.instance_id();
        let rootfs = Provisioner::from_config(&self.config).provision(instance)?;

        let limiter = ResourceLimiter::new(&self.config.cgroup_root);
        match limiter.establish(instance, self.spec.memory_limit()) {
            Ok(boundary) => Ok((rootfs, boundary)),
            Err(e) => {
                self.dispose_rootfs(rootfs);
                Err(e)
            }
        }
    }

    fn dispose_rootfs(&self, rootfs: RootfsInstance) {
        if self.config.keep_rootfs {
            tracing::info!(path = %rootfs.path().display(), "rootfs kept for inspection");
            return;
        }
        let path = rootfs.path().to_path_buf();
        if let Err(e) = rootfs.remove() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove rootfs");
        }
    }

    fn transition(&mut self, next: ContainerState) {
        tracing::info!(
            instance = %self.spec.instance_id(),
            from = %self.state,
            to = %next,
            "container state changed"
        );
        self.state = next;
    }
}

/// Fails unless the process runs with an effective uid of 0.
///
/// # Errors
///
/// Returns `BurrowError::Precondition` for unprivileged callers.
#[cfg(target_os = "linux")]
pub fn require_root() -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        return Ok(());
    }
    Err(BurrowError::Precondition {
        artifact: "root privileges".into(),
        remediation: "namespaces, chroot and cgroups need root; run again with sudo".into(),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; native containers require Linux.
#[cfg(not(target_os = "linux"))]
pub fn require_root() -> Result<()> {
    Err(BurrowError::Config {
        message: "Linux required for native container operations".into(),
    })
}

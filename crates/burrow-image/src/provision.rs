//! Per-instance root filesystem provisioning.
//!
//! Each container gets a private, writable copy of the shared base image
//! under `<rootfs_dir>/<instance_id>`, plus the host's resolver config and
//! an optional helper tool.

use std::path::{Path, PathBuf};

use burrow_common::config::{RuntimeConfig, ToolConfig};
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::InstanceId;

use crate::inject;
use crate::layer;

/// A provisioned root filesystem, owned by one container instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootfsInstance {
    id: InstanceId,
    path: PathBuf,
}

impl RootfsInstance {
    /// Instance the rootfs belongs to.
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Absolute path of the rootfs directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the rootfs from disk.
    ///
    /// Only safe once every process that chrooted into it has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be removed.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.path).map_err(|e| BurrowError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "rootfs removed");
        Ok(())
    }
}

/// Materializes root filesystems from the shared base image.
#[derive(Debug, Clone)]
pub struct Provisioner {
    base_image: PathBuf,
    rootfs_dir: PathBuf,
    resolv_conf: PathBuf,
    tool: Option<ToolConfig>,
}

impl Provisioner {
    /// Builds a provisioner from the runtime configuration.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            base_image: config.base_image.clone(),
            rootfs_dir: config.rootfs_dir.clone(),
            resolv_conf: config.resolv_conf.clone(),
            tool: config.tool.clone(),
        }
    }

    /// Checks that the base image and any required tool exist.
    ///
    /// Runs before anything is written to disk.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Precondition` naming the missing artifact.
    pub fn check_preconditions(&self) -> Result<()> {
        if !self.base_image.is_file() {
            return Err(BurrowError::Precondition {
                artifact: format!("base image {}", self.base_image.display()),
                remediation: format!(
                    "export one with: docker export \"$(docker create ubuntu:20.04 /bin/bash)\" -o {}",
                    self.base_image.display()
                ),
            });
        }
        if let Some(tool) = self.tool.as_ref().filter(|t| t.required) {
            if !tool.source.is_file() {
                return Err(BurrowError::Precondition {
                    artifact: format!("required tool {}", tool.source.display()),
                    remediation: format!(
                        "build it first (e.g. gcc -o {0} {0}.c) or drop it from the configuration",
                        tool.source.display()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Creates and populates the rootfs for `instance`.
    ///
    /// # Errors
    ///
    /// - `Precondition` if the base image or a required tool is missing.
    /// - `InstanceCollision` if the instance directory already exists.
    /// - `Extraction` if the archive cannot be unpacked.
    /// - `Injection` if a required tool cannot be copied in.
    pub fn provision(&self, instance: &InstanceId) -> Result<RootfsInstance> {
        self.check_preconditions()?;

        std::fs::create_dir_all(&self.rootfs_dir)
            .map_err(|e| BurrowError::io(&self.rootfs_dir, e))?;
        let path = self.rootfs_dir.join(instance.as_str());
        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BurrowError::InstanceCollision { path });
            }
            Err(e) => return Err(BurrowError::io(&path, e)),
        }
        let path = std::fs::canonicalize(&path).map_err(|e| BurrowError::io(&path, e))?;
        tracing::info!(instance = %instance, path = %path.display(), "preparing rootfs");

        let _ = layer::extract_layer(&self.base_image, &path)?;

        match inject::inject_resolv_conf(&path, &self.resolv_conf) {
            Ok(dest) => tracing::debug!(dest = %dest.display(), "resolver config copied"),
            Err(e) => tracing::warn!(
                source = %self.resolv_conf.display(),
                error = %e,
                "could not copy resolver config; DNS may not work inside the container"
            ),
        }

        if let Some(tool) = &self.tool {
            match inject::inject_tool(&path, &tool.source) {
                Ok(dest) => tracing::info!(dest = %dest.display(), "tool injected"),
                Err(e) if tool.required => {
                    return Err(BurrowError::Injection {
                        artifact: tool.source.clone(),
                        source: e,
                    });
                }
                Err(e) => tracing::warn!(
                    tool = %tool.source.display(),
                    error = %e,
                    "could not inject optional tool"
                ),
            }
        }

        Ok(RootfsInstance {
            id: instance.clone(),
            path,
        })
    }
}

//! Runtime configuration model.
//!
//! Loaded from an optional JSON file; any field left out falls back to the
//! defaults in [`crate::constants`]. The CLI overrides individual fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BurrowError, Result};

/// Root configuration for a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Shared, read-only base image archive (`.tar`, `.tar.gz` or `.tgz`).
    pub base_image: PathBuf,
    /// Directory under which one rootfs per instance is created.
    pub rootfs_dir: PathBuf,
    /// Mount point of the cgroup filesystem.
    pub cgroup_root: PathBuf,
    /// Host resolver configuration copied into each rootfs.
    pub resolv_conf: PathBuf,
    /// Helper executable injected into the rootfs, if any.
    pub tool: Option<ToolConfig>,
    /// Command run as the container's init process.
    pub shell: Vec<String>,
    /// Keep the rootfs on disk after the container exits.
    pub keep_rootfs: bool,
}

/// A helper executable copied into `/usr/local/bin` of each rootfs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Host path of the executable.
    pub source: PathBuf,
    /// Abort the launch when the tool cannot be injected.
    #[serde(default)]
    pub required: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_image: PathBuf::from(constants::DEFAULT_BASE_IMAGE),
            rootfs_dir: PathBuf::from(constants::DEFAULT_ROOTFS_DIR),
            cgroup_root: PathBuf::from(constants::CGROUP_MOUNT),
            resolv_conf: PathBuf::from(constants::HOST_RESOLV_CONF),
            tool: None,
            shell: vec![constants::DEFAULT_SHELL.to_string()],
            keep_rootfs: true,
        }
    }
}

impl RuntimeConfig {
    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the shell command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.shell.first().is_none_or(String::is_empty) {
            return Err(BurrowError::Config {
                message: "shell command must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_system_paths() {
        let config = RuntimeConfig::default();
        assert_eq!(config.cgroup_root, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(config.shell, vec!["/bin/bash"]);
        assert!(config.keep_rootfs);
        assert!(config.tool.is_none());
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burrow.json");
        std::fs::write(
            &path,
            r#"{ "base_image": "/srv/base.tar.gz", "tool": { "source": "/opt/memory_hog", "required": true } }"#,
        )
        .unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.base_image, PathBuf::from("/srv/base.tar.gz"));
        assert_eq!(config.rootfs_dir, PathBuf::from("/var/lib/burrow/rootfs"));
        let tool = config.tool.unwrap();
        assert!(tool.required);
        assert_eq!(tool.source, PathBuf::from("/opt/memory_hog"));
    }

    #[test]
    fn load_rejects_empty_shell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("burrow.json");
        std::fs::write(&path, r#"{ "shell": [] }"#).unwrap();
        assert!(matches!(
            RuntimeConfig::load(&path),
            Err(BurrowError::Config { .. })
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuntimeConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(BurrowError::Io { .. })));
    }
}

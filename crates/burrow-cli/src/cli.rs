//! Command-line arguments and their mapping onto the runtime model.

use std::path::PathBuf;

use burrow_common::config::{RuntimeConfig, ToolConfig};
use burrow_common::error::Result;
use burrow_common::types::{ContainerSpec, MemoryLimit};
use clap::Parser;

/// burrow: run a shell in a throwaway, isolated root filesystem.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Hostname of the container; also keys its rootfs and cgroup.
    pub hostname: String,

    /// Memory ceiling in megabytes. Omit for no limit.
    #[arg(short, long, value_name = "MB", env = "BURROW_MEMORY_LIMIT")]
    pub memory_limit: Option<u64>,

    /// JSON runtime configuration; flags override its fields.
    #[arg(long, value_name = "FILE", env = "BURROW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base image archive (.tar, .tar.gz or .tgz).
    #[arg(long, value_name = "FILE", env = "BURROW_IMAGE")]
    pub image: Option<PathBuf>,

    /// Directory holding one rootfs per instance.
    #[arg(long, value_name = "DIR", env = "BURROW_ROOTFS_DIR")]
    pub rootfs_dir: Option<PathBuf>,

    /// Mount point of the cgroup filesystem.
    #[arg(long, value_name = "DIR", env = "BURROW_CGROUP_ROOT")]
    pub cgroup_root: Option<PathBuf>,

    /// Resolver configuration copied into the rootfs.
    #[arg(long, value_name = "FILE", env = "BURROW_RESOLV_CONF")]
    pub resolv_conf: Option<PathBuf>,

    /// Executable to install under /usr/local/bin in the rootfs.
    #[arg(long, value_name = "FILE", env = "BURROW_TOOL")]
    pub tool: Option<PathBuf>,

    /// Abort when the tool cannot be installed.
    #[arg(long, requires = "tool")]
    pub tool_required: bool,

    /// Delete the rootfs after the container exits.
    #[arg(long)]
    pub remove_rootfs: bool,

    /// Command to run instead of the default shell; consumes the rest of
    /// the line.
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    pub shell: Vec<String>,
}

impl Cli {
    /// Validated launch request for this invocation.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` for a bad hostname or limit.
    pub fn container_spec(&self) -> Result<ContainerSpec> {
        let limit = self
            .memory_limit
            .map(MemoryLimit::from_megabytes)
            .transpose()?;
        ContainerSpec::new(self.hostname.clone(), limit)
    }

    /// Runtime configuration: the config file or defaults, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or the merged
    /// configuration is invalid.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };

        if let Some(image) = &self.image {
            config.base_image.clone_from(image);
        }
        if let Some(dir) = &self.rootfs_dir {
            config.rootfs_dir.clone_from(dir);
        }
        if let Some(root) = &self.cgroup_root {
            config.cgroup_root.clone_from(root);
        }
        if let Some(resolv) = &self.resolv_conf {
            config.resolv_conf.clone_from(resolv);
        }
        if let Some(tool) = &self.tool {
            config.tool = Some(ToolConfig {
                source: tool.clone(),
                required: self.tool_required,
            });
        }
        if self.remove_rootfs {
            config.keep_rootfs = false;
        }
        if !self.shell.is_empty() {
            config.shell.clone_from(&self.shell);
        }

        config.validate()?;
        Ok(config)
    }
}

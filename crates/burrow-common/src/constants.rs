//! System-wide constants and default paths.

/// Default base directory for burrow data.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/burrow";
/// Default location of the shared base image archive.
pub const DEFAULT_BASE_IMAGE: &str = "/var/lib/burrow/base-rootfs.tar";
/// Default directory holding one rootfs per container instance.
pub const DEFAULT_ROOTFS_DIR: &str = "/var/lib/burrow/rootfs";

/// Mount point of the cgroup filesystem.
pub const CGROUP_MOUNT: &str = "/sys/fs/cgroup";
/// Prefix of every resource boundary directory created by burrow.
pub const CGROUP_PREFIX: &str = "burrow";

/// Host resolver configuration copied into each rootfs.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";
/// Location of the resolver configuration inside a rootfs.
pub const ROOTFS_RESOLV_CONF: &str = "etc/resolv.conf";
/// Directory (relative to the rootfs) receiving injected tooling.
pub const TOOL_INSTALL_DIR: &str = "usr/local/bin";

/// Shell started as the container's init process.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Bytes in one mebibyte; memory limits are given in whole megabytes.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Longest hostname accepted by `sethostname(2)`.
pub const HOSTNAME_MAX_LEN: usize = 64;

/// Application name used in CLI output.
pub const APP_NAME: &str = "burrow";

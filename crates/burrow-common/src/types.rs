//! Domain primitive types used across the burrow workspace.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::constants::{BYTES_PER_MB, HOSTNAME_MAX_LEN};
use crate::error::{BurrowError, Result};

/// Unique identifier for one container instance on this host.
///
/// Formed as `<hostname>_<pid>`. Hostnames never contain `_`, so the pid is
/// always the final segment and two launches only collide when both the
/// hostname and the launching pid match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Derives the instance id for `hostname` launched by process `pid`.
    #[must_use]
    pub fn derive(hostname: &Hostname, pid: u32) -> Self {
        Self(format!("{hostname}_{pid}"))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated UTS hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hostname(String);

impl Hostname {
    /// Validates and wraps a hostname.
    ///
    /// Accepts 1 to 64 bytes of ASCII letters, digits, `-` and `.`, not
    /// starting with `-` or `.`. The hostname also names host directories,
    /// so path separators and `..` must never get through.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` if the value is rejected.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(BurrowError::InvalidSpec {
                message: "hostname must not be empty".into(),
            });
        }
        if value.len() > HOSTNAME_MAX_LEN {
            return Err(BurrowError::InvalidSpec {
                message: format!("hostname exceeds {HOSTNAME_MAX_LEN} bytes: {value}"),
            });
        }
        if value.starts_with(['-', '.']) {
            return Err(BurrowError::InvalidSpec {
                message: format!("hostname must start with a letter or digit: {value}"),
            });
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(BurrowError::InvalidSpec {
                message: format!("hostname contains invalid character {bad:?}: {value}"),
            });
        }
        Ok(Self(value))
    }

    /// Returns the hostname as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A memory ceiling in bytes. Never zero: an absent limit means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryLimit(NonZeroU64);

impl MemoryLimit {
    /// Converts whole megabytes to a byte limit (`mb * 1048576`).
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` for zero or for values that
    /// overflow a 64-bit byte count.
    pub fn from_megabytes(mb: u64) -> Result<Self> {
        let bytes = mb.checked_mul(BYTES_PER_MB).ok_or_else(|| BurrowError::InvalidSpec {
            message: format!("memory limit of {mb} MB overflows"),
        })?;
        Self::from_bytes(bytes)
    }

    /// Wraps an exact byte count.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` for zero.
    pub fn from_bytes(bytes: u64) -> Result<Self> {
        NonZeroU64::new(bytes)
            .map(Self)
            .ok_or_else(|| BurrowError::InvalidSpec {
                message: "memory limit must be positive".into(),
            })
    }

    /// Returns the limit in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0.get()
    }
}

/// Identity and configuration of one launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    hostname: Hostname,
    memory_limit: Option<MemoryLimit>,
    instance_id: InstanceId,
}

impl ContainerSpec {
    /// Builds a spec keyed by the current process id.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` if the hostname is rejected.
    pub fn new(hostname: impl Into<String>, memory_limit: Option<MemoryLimit>) -> Result<Self> {
        Self::for_process(hostname, memory_limit, std::process::id())
    }

    /// Builds a spec keyed by an explicit launching pid.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::InvalidSpec` if the hostname is rejected.
    pub fn for_process(
        hostname: impl Into<String>,
        memory_limit: Option<MemoryLimit>,
        pid: u32,
    ) -> Result<Self> {
        let hostname = Hostname::parse(hostname)?;
        let instance_id = InstanceId::derive(&hostname, pid);
        Ok(Self {
            hostname,
            memory_limit,
            instance_id,
        })
    }

    /// Hostname the container will see.
    #[must_use]
    pub const fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// Requested memory ceiling, if any.
    #[must_use]
    pub const fn memory_limit(&self) -> Option<MemoryLimit> {
        self.memory_limit
    }

    /// Unique key for this launch's rootfs and resource boundary.
    #[must_use]
    pub const fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Container has been created but not yet started.
    Created,
    /// Container is actively running.
    Running,
    /// Container has exited.
    Stopped,
    /// Container failed to launch.
    Failed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A step of the namespace launch sequence, used to label failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchStage {
    /// Forking the intermediate or init process.
    Fork,
    /// Placing the launching process into the resource boundary.
    CgroupAttach,
    /// Requesting the new namespaces.
    Unshare,
    /// Making the inherited mount table private.
    MakePrivate,
    /// Setting the UTS hostname.
    Sethostname,
    /// Changing the filesystem root.
    Chroot,
    /// Mounting a pseudo-filesystem at the given target.
    Mount(String),
    /// Replacing the init process image with the shell.
    Exec,
    /// Waiting for the container to exit.
    Wait,
}

impl fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fork => write!(f, "fork"),
            Self::CgroupAttach => write!(f, "cgroup-attach"),
            Self::Unshare => write!(f, "unshare"),
            Self::MakePrivate => write!(f, "make-private"),
            Self::Sethostname => write!(f, "sethostname"),
            Self::Chroot => write!(f, "chroot"),
            Self::Mount(target) => write!(f, "mount {target}"),
            Self::Exec => write!(f, "exec"),
            Self::Wait => write!(f, "wait"),
        }
    }
}

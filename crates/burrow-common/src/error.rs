//! Unified error types for the burrow workspace.
//!
//! Variants are grouped by launch phase: preconditions, provisioning,
//! resource limiting, namespace entry, and teardown. Every fatal variant
//! aborts the launch before the container becomes interactive; teardown
//! errors are only ever logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::LaunchStage;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A launch request carried an invalid hostname or limit.
    #[error("invalid container spec: {message}")]
    InvalidSpec {
        /// Description of the rejected value.
        message: String,
    },

    /// Something the launch depends on is missing.
    #[error("{artifact} is missing\n{remediation}")]
    Precondition {
        /// The missing artifact.
        artifact: String,
        /// What the operator should do about it.
        remediation: String,
    },

    /// The base image could not be extracted.
    #[error("failed to extract base image {archive}: {source}")]
    Extraction {
        /// Archive being extracted.
        archive: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A mandatory file could not be injected into the rootfs.
    #[error("failed to inject {artifact} into the rootfs: {source}")]
    Injection {
        /// File that could not be injected.
        artifact: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A directory keyed by the instance id already exists.
    #[error("{path} already exists; refusing to share state with another instance")]
    InstanceCollision {
        /// Path that was expected to be fresh.
        path: PathBuf,
    },

    /// The resource boundary could not be created or configured.
    #[error("failed to create resource boundary {path}: {source}")]
    BoundaryCreate {
        /// Boundary directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A namespace, mount, chroot, or exec step failed.
    #[error("namespace setup failed at {stage}: {message}")]
    Namespace {
        /// Stage that failed.
        stage: LaunchStage,
        /// Description of the failure.
        message: String,
    },

    /// The resource boundary still holds processes and cannot be removed.
    #[error(
        "resource boundary {path} is busy: {source}\nremove it manually once its processes exit: sudo rmdir {path}"
    )]
    BoundaryBusy {
        /// Boundary directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Builds a [`BurrowError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`BurrowError::Namespace`] for the given stage.
    pub fn namespace(stage: LaunchStage, message: impl std::fmt::Display) -> Self {
        Self::Namespace {
            stage,
            message: message.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;

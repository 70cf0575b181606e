//! Memory resource control.
//!
//! Writes the hard ceiling into `memory.max` (v2) or
//! `memory.limit_in_bytes` (v1).

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

use super::CgroupVersion;

/// Name of the hard-limit control file for the given hierarchy version.
#[must_use]
pub const fn limit_file(version: CgroupVersion) -> &'static str {
    match version {
        CgroupVersion::V1 => "memory.limit_in_bytes",
        CgroupVersion::V2 => "memory.max",
    }
}

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns `BurrowError::BoundaryCreate` if the control file cannot be
/// written; an unenforceable limit must stop the launch.
pub fn set_memory_max(cgroup_path: &Path, version: CgroupVersion, bytes: u64) -> Result<()> {
    let file = cgroup_path.join(limit_file(version));
    std::fs::write(&file, bytes.to_string()).map_err(|e| BurrowError::BoundaryCreate {
        path: cgroup_path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(bytes, file = %file.display(), "memory limit written");
    Ok(())
}

/// Reads back the hard memory limit of a cgroup.
///
/// Returns `None` for the v2 `max` keyword (no limit).
///
/// # Errors
///
/// Returns an error if the control file is unreadable or does not hold a
/// byte count.
pub fn read_memory_max(cgroup_path: &Path, version: CgroupVersion) -> Result<Option<u64>> {
    let file = cgroup_path.join(limit_file(version));
    let raw = std::fs::read_to_string(&file).map_err(|e| BurrowError::io(&file, e))?;
    let value = raw.trim();
    if value == "max" {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|e| BurrowError::Config {
        message: format!("unexpected value {value:?} in {}: {e}", file.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_file_follows_hierarchy_version() {
        assert_eq!(limit_file(CgroupVersion::V2), "memory.max");
        assert_eq!(limit_file(CgroupVersion::V1), "memory.limit_in_bytes");
    }

    #[test]
    fn written_limit_reads_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        set_memory_max(dir.path(), CgroupVersion::V2, 104_857_600).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("memory.max")).unwrap(),
            "104857600"
        );
        assert_eq!(
            read_memory_max(dir.path(), CgroupVersion::V2).unwrap(),
            Some(104_857_600)
        );
    }

    #[test]
    fn max_keyword_means_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.max"), "max\n").unwrap();
        assert_eq!(read_memory_max(dir.path(), CgroupVersion::V2).unwrap(), None);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = set_memory_max(&dir.path().join("gone"), CgroupVersion::V1, 1);
        assert!(matches!(result, Err(BurrowError::BoundaryCreate { .. })));
    }
}

//! Cgroup resource management.
//!
//! Creates one resource boundary per container instance under the memory
//! controller of the host hierarchy and tears it down again. Both the
//! unified (v2) hierarchy at `/sys/fs/cgroup` and the legacy (v1) memory
//! controller at `/sys/fs/cgroup/memory` are supported.

pub mod memory;

use std::io::Write;
use std::path::{Path, PathBuf};

use burrow_common::constants::CGROUP_PREFIX;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{InstanceId, MemoryLimit};

/// Cgroup hierarchy flavour found on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Legacy per-controller hierarchies.
    V1,
    /// Unified hierarchy.
    V2,
}

/// The memory-controller root a boundary is created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupHierarchy {
    root: PathBuf,
    version: CgroupVersion,
}

impl CgroupHierarchy {
    /// Detects the hierarchy mounted at `mount`.
    ///
    /// A `cgroup.controllers` file marks the unified hierarchy; otherwise a
    /// `memory` subdirectory is expected.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::BoundaryCreate` if neither layout is present.
    pub fn detect(mount: &Path) -> Result<Self> {
        if mount.join("cgroup.controllers").is_file() {
            return Ok(Self {
                root: mount.to_path_buf(),
                version: CgroupVersion::V2,
            });
        }
        let legacy = mount.join("memory");
        if legacy.is_dir() {
            return Ok(Self {
                root: legacy,
                version: CgroupVersion::V1,
            });
        }
        Err(BurrowError::BoundaryCreate {
            path: mount.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no cgroup memory controller found",
            ),
        })
    }

    /// Directory of the root scope processes are migrated back to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hierarchy flavour.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Path of the boundary directory for `instance`.
    #[must_use]
    pub fn boundary_path(&self, instance: &InstanceId) -> PathBuf {
        self.root.join(format!("{CGROUP_PREFIX}_{instance}"))
    }

    /// Makes the memory controller available to child cgroups (v2 only).
    ///
    /// Hosts usually have it enabled already, so failure is only logged.
    fn enable_memory_controller(&self) {
        if self.version != CgroupVersion::V2 {
            return;
        }
        let control = self.root.join("cgroup.subtree_control");
        if !control.is_file() {
            return;
        }
        if let Err(e) = std::fs::write(&control, "+memory") {
            tracing::debug!(path = %control.display(), error = %e, "could not enable memory controller");
        }
    }
}

/// Creates resource boundaries for container instances.
#[derive(Debug, Clone)]
pub struct ResourceLimiter {
    mount: PathBuf,
}

impl ResourceLimiter {
    /// Creates a limiter for the cgroup filesystem mounted at `mount`.
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    /// Creates the boundary for `instance` and writes its limit.
    ///
    /// Returns `Ok(None)` without touching the cgroup filesystem when no
    /// limit was requested.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::BoundaryCreate` if the hierarchy is missing,
    /// the directory already exists, or the limit cannot be written.
    pub fn establish(
        &self,
        instance: &InstanceId,
        limit: Option<MemoryLimit>,
    ) -> Result<Option<ResourceBoundary>> {
        let Some(limit) = limit else {
            tracing::debug!(instance = %instance, "no memory limit requested");
            return Ok(None);
        };

        let hierarchy = CgroupHierarchy::detect(&self.mount)?;
        hierarchy.enable_memory_controller();

        let path = hierarchy.boundary_path(instance);
        std::fs::create_dir(&path).map_err(|e| BurrowError::BoundaryCreate {
            path: path.clone(),
            source: e,
        })?;

        if let Err(e) = memory::set_memory_max(&path, hierarchy.version, limit.bytes()) {
            if let Err(cleanup) = std::fs::remove_dir(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove half-created cgroup");
            }
            return Err(e);
        }

        match memory::read_memory_max(&path, hierarchy.version) {
            Ok(Some(actual)) if actual == limit.bytes() => {}
            Ok(actual) => tracing::warn!(
                requested = limit.bytes(),
                actual = ?actual,
                "kernel adjusted the memory limit"
            ),
            Err(e) => tracing::warn!(error = %e, "could not read back memory limit"),
        }

        tracing::info!(
            path = %path.display(),
            bytes = limit.bytes(),
            version = ?hierarchy.version,
            "cgroup created"
        );
        Ok(Some(ResourceBoundary {
            path,
            hierarchy,
            limit,
            released: false,
        }))
    }
}

/// A live cgroup directory holding one container's memory limit.
///
/// Torn down exactly once: explicitly through [`ResourceBoundary::release`]
/// or, failing that, when dropped.
#[derive(Debug)]
pub struct ResourceBoundary {
    path: PathBuf,
    hierarchy: CgroupHierarchy,
    limit: MemoryLimit,
    released: bool,
}

impl ResourceBoundary {
    /// Boundary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Limit written into the boundary.
    #[must_use]
    pub const fn limit(&self) -> MemoryLimit {
        self.limit
    }

    /// Hierarchy the boundary lives in.
    #[must_use]
    pub const fn hierarchy(&self) -> &CgroupHierarchy {
        &self.hierarchy
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn attach(&self, pid: u32) -> Result<()> {
        let procs_path = self.path.join("cgroup.procs");
        std::fs::write(&procs_path, pid.to_string())
            .map_err(|e| BurrowError::io(&procs_path, e))?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// PIDs currently registered in the boundary.
    ///
    /// A missing `cgroup.procs` is treated as an empty boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn member_pids(&self) -> Result<Vec<u32>> {
        let procs_path = self.path.join("cgroup.procs");
        let raw = match std::fs::read_to_string(&procs_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BurrowError::io(&procs_path, e)),
        };
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match line.parse() {
                Ok(pid) => Some(pid),
                Err(_) => {
                    tracing::warn!(line, "ignoring malformed cgroup.procs entry");
                    None
                }
            })
            .collect())
    }

    /// Migrates remaining processes to the root scope and removes the
    /// boundary directory.
    ///
    /// Idempotent: an already removed directory is reported as
    /// [`TeardownOutcome::AlreadyGone`]. Per-process migration failures are
    /// collected in the report and never stop the teardown.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::BoundaryBusy` if the directory cannot be removed.
    pub fn teardown(&mut self) -> Result<TeardownReport> {
        self.released = true;
        if !self.path.exists() {
            return Ok(TeardownReport::gone(self.path.clone()));
        }

        let pids = self.member_pids().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not list cgroup members");
            Vec::new()
        });
        let root_procs = self.hierarchy.root.join("cgroup.procs");
        let migrations = pids
            .into_iter()
            .map(|pid| Migration {
                pid,
                result: migrate(&root_procs, pid),
            })
            .collect();

        match std::fs::remove_dir(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BurrowError::BoundaryBusy {
                    path: self.path.clone(),
                    source: e,
                });
            }
        }

        Ok(TeardownReport {
            path: self.path.clone(),
            migrations,
            outcome: TeardownOutcome::Removed,
        })
    }

    /// Tears the boundary down and logs the outcome.
    ///
    /// Teardown errors are reported to the operator, never returned: by the
    /// time this runs the container's work is already done.
    pub fn release(mut self) -> Option<TeardownReport> {
        match self.teardown() {
            Ok(report) => {
                report.log();
                Some(report)
            }
            Err(e) => {
                tracing::error!("{e}");
                None
            }
        }
    }
}

impl Drop for ResourceBoundary {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::debug!(path = %self.path.display(), "releasing cgroup on drop");
        match self.teardown() {
            Ok(report) => report.log(),
            Err(e) => tracing::error!("{e}"),
        }
    }
}

fn migrate(root_procs: &Path, pid: u32) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().write(true).open(root_procs)?;
    file.write_all(pid.to_string().as_bytes())
}

/// Result of moving one leftover process out of a boundary.
#[derive(Debug)]
pub struct Migration {
    /// Process that was moved.
    pub pid: u32,
    /// Outcome of the write to the root scope.
    pub result: std::io::Result<()>,
}

/// What teardown found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The directory was removed by this call.
    Removed,
    /// The directory no longer existed.
    AlreadyGone,
}

/// Per-item outcomes of one teardown.
#[derive(Debug)]
pub struct TeardownReport {
    /// Boundary directory.
    pub path: PathBuf,
    /// One entry per process found in the boundary.
    pub migrations: Vec<Migration>,
    /// Final state of the directory.
    pub outcome: TeardownOutcome,
}

impl TeardownReport {
    fn gone(path: PathBuf) -> Self {
        Self {
            path,
            migrations: Vec::new(),
            outcome: TeardownOutcome::AlreadyGone,
        }
    }

    /// Migrations that could not be completed.
    pub fn failed_migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter().filter(|m| m.result.is_err())
    }

    fn log(&self) {
        for failed in self.failed_migrations() {
            if let Err(e) = &failed.result {
                tracing::warn!(pid = failed.pid, error = %e, "could not migrate process out of cgroup");
            }
        }
        match self.outcome {
            TeardownOutcome::Removed => {
                tracing::info!(path = %self.path.display(), migrated = self.migrations.len(), "cgroup destroyed");
            }
            TeardownOutcome::AlreadyGone => {
                tracing::debug!(path = %self.path.display(), "cgroup already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use burrow_common::types::ContainerSpec;

    use super::*;

    fn fake_v2(dir: &Path) {
        std::fs::write(dir.join("cgroup.controllers"), "cpu memory io").unwrap();
        std::fs::write(dir.join("cgroup.procs"), "").unwrap();
    }

    /// cgroupfs drops control files together with the directory; a plain
    /// filesystem needs them removed before `rmdir` can succeed.
    fn drop_control_files(path: &Path) {
        for entry in std::fs::read_dir(path).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }
    }

    fn spec(hostname: &str, mb: Option<u64>) -> ContainerSpec {
        let limit = mb.map(|mb| MemoryLimit::from_megabytes(mb).unwrap());
        ContainerSpec::for_process(hostname, limit, 777).unwrap()
    }

    #[test]
    fn detect_prefers_unified_hierarchy() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let hierarchy = CgroupHierarchy::detect(dir.path()).unwrap();
        assert_eq!(hierarchy.version(), CgroupVersion::V2);
        assert_eq!(hierarchy.root(), dir.path());
    }

    #[test]
    fn detect_falls_back_to_legacy_memory_controller() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("memory")).unwrap();
        let hierarchy = CgroupHierarchy::detect(dir.path()).unwrap();
        assert_eq!(hierarchy.version(), CgroupVersion::V1);
        assert_eq!(hierarchy.root(), dir.path().join("memory"));
    }

    #[test]
    fn detect_without_memory_controller_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CgroupHierarchy::detect(dir.path()),
            Err(BurrowError::BoundaryCreate { .. })
        ));
    }

    #[test]
    fn no_limit_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let before = std::fs::read_dir(dir.path()).unwrap().count();

        let s = spec("testbox", None);
        let boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap();

        assert!(boundary.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), before);
    }

    #[test]
    fn no_limit_never_probes_the_hierarchy() {
        let s = spec("testbox", None);
        let boundary = ResourceLimiter::new("/nonexistent/cgroup")
            .establish(s.instance_id(), s.memory_limit())
            .unwrap();
        assert!(boundary.is_none());
    }

    #[test]
    fn establish_writes_exact_byte_limit() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("capped", Some(100));

        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();

        assert_eq!(boundary.path(), dir.path().join("burrow_capped_777"));
        let written = std::fs::read_to_string(boundary.path().join("memory.max")).unwrap();
        assert_eq!(written, "104857600");

        drop_control_files(boundary.path());
        let _ = boundary.teardown().unwrap();
    }

    #[test]
    fn establish_on_legacy_hierarchy_uses_limit_in_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("memory")).unwrap();
        let s = spec("legacy", Some(64));

        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();

        let written =
            std::fs::read_to_string(boundary.path().join("memory.limit_in_bytes")).unwrap();
        assert_eq!(written, (64 * 1024 * 1024).to_string());

        drop_control_files(boundary.path());
        let _ = boundary.teardown().unwrap();
    }

    #[test]
    fn establish_fails_closed_on_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("dup", Some(16));
        std::fs::create_dir(dir.path().join("burrow_dup_777")).unwrap();

        let result = ResourceLimiter::new(dir.path()).establish(s.instance_id(), s.memory_limit());
        assert!(matches!(result, Err(BurrowError::BoundaryCreate { .. })));
    }

    #[test]
    fn teardown_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("twice", Some(32));
        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();
        drop_control_files(boundary.path());

        let first = boundary.teardown().unwrap();
        assert_eq!(first.outcome, TeardownOutcome::Removed);
        assert!(!boundary.path().exists());

        let second = boundary.teardown().unwrap();
        assert_eq!(second.outcome, TeardownOutcome::AlreadyGone);
    }

    #[test]
    fn teardown_after_external_removal_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("external", Some(32));
        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();

        std::fs::remove_dir_all(boundary.path()).unwrap();

        let report = boundary.teardown().unwrap();
        assert_eq!(report.outcome, TeardownOutcome::AlreadyGone);
    }

    #[test]
    fn teardown_migrates_members_to_root_scope() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("members", Some(32));
        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();
        boundary.attach(4321).unwrap();
        assert_eq!(boundary.member_pids().unwrap(), vec![4321]);

        // Only the membership file stays behind, so removal reports busy.
        std::fs::remove_file(boundary.path().join("memory.max")).unwrap();
        let err = boundary.teardown().unwrap_err();
        assert!(matches!(err, BurrowError::BoundaryBusy { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("cgroup.procs")).unwrap(),
            "4321"
        );
    }

    #[test]
    fn failed_migrations_do_not_stop_teardown() {
        let dir = tempfile::tempdir().unwrap();
        // No root cgroup.procs: every migration write fails.
        std::fs::write(dir.path().join("cgroup.controllers"), "memory").unwrap();
        let s = spec("orphans", Some(32));
        let mut boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();
        std::fs::write(boundary.path().join("cgroup.procs"), "11\n12\n").unwrap();

        // Teardown still reaches the removal step.
        let err = boundary.teardown().unwrap_err();
        assert!(matches!(err, BurrowError::BoundaryBusy { .. }));
        assert!(!dir.path().join("cgroup.procs").exists());
    }

    #[test]
    fn migrate_into_missing_root_scope_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(migrate(&dir.path().join("cgroup.procs"), 1).is_err());
    }

    #[test]
    fn failed_migrations_filter_reports_errors_only() {
        let report = TeardownReport {
            path: PathBuf::from("/sys/fs/cgroup/burrow_x_1"),
            migrations: vec![
                Migration { pid: 1, result: Ok(()) },
                Migration {
                    pid: 2,
                    result: Err(std::io::Error::from_raw_os_error(3)),
                },
            ],
            outcome: TeardownOutcome::Removed,
        };
        let failed: Vec<_> = report.failed_migrations().map(|m| m.pid).collect();
        assert_eq!(failed, vec![2]);
    }

    #[test]
    fn release_on_busy_boundary_logs_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("busy", Some(8));
        let boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();
        let path = boundary.path().to_path_buf();

        assert!(boundary.release().is_none());
        assert!(path.exists());
    }

    #[test]
    fn drop_tears_down_unreleased_boundary() {
        let dir = tempfile::tempdir().unwrap();
        fake_v2(dir.path());
        let s = spec("dropped", Some(8));
        let boundary = ResourceLimiter::new(dir.path())
            .establish(s.instance_id(), s.memory_limit())
            .unwrap()
            .unwrap();
        let path = boundary.path().to_path_buf();
        drop_control_files(&path);

        drop(boundary);
        assert!(!path.exists());
    }
}

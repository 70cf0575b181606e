//! Process supervision inside isolated namespaces.
//!
//! The supervisor forks an intermediate child that joins the resource
//! boundary and unshares the namespaces, then forks the container's init
//! (PID 1 of the new PID namespace). Init isolates its mount table, sets
//! the hostname, enters the rootfs, mounts the pseudo-filesystems and
//! execs the shell.
//!
//! Children never return into the caller's stack frames. A failure on
//! either side of the fork is written as JSON to a close-on-exec pipe and
//! the child `_exit`s; a successful exec closes the pipe, so EOF with no
//! payload means the shell is running.
//!
//! The children allocate and log between fork and exec, so [`supervise`]
//! must be called while the process is single-threaded. Interrupts are
//! therefore handled with plain `SIG_IGN` dispositions, as `system(3)`
//! does, rather than with a signal-handling thread. If init is killed by a
//! signal, the intermediate dies of the same signal so the supervisor sees
//! [`ExitOutcome::Signaled`].

use std::ffi::CString;
use std::path::Path;

use serde::{Deserialize, Serialize};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Hostname, LaunchStage};
use burrow_core::cgroup::ResourceBoundary;

/// How the container's init process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with the given status code.
    Exited(i32),
    /// Killed by a signal.
    Signaled(nix::sys::signal::Signal),
}

impl ExitOutcome {
    /// Shell-style exit code: the status itself, or `128 + signal`.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Exited(code) => u8::try_from(code).unwrap_or(1),
            Self::Signaled(signal) => u8::try_from(128 + signal as i32).unwrap_or(u8::MAX),
        }
    }

    /// Whether the container exited cleanly.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// Failure report sent from a child back to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFailure {
    /// Step that failed.
    pub stage: LaunchStage,
    /// Error text.
    pub message: String,
}

impl LaunchFailure {
    /// Labels `err` with its own stage, or `fallback` if it carries none.
    #[must_use]
    pub fn from_error(fallback: LaunchStage, err: BurrowError) -> Self {
        match err {
            BurrowError::Namespace { stage, message } => Self { stage, message },
            other => Self {
                stage: fallback,
                message: other.to_string(),
            },
        }
    }
}

impl From<LaunchFailure> for BurrowError {
    fn from(failure: LaunchFailure) -> Self {
        Self::Namespace {
            stage: failure.stage,
            message: failure.message,
        }
    }
}

/// Everything the children need, borrowed from the controller.
#[derive(Debug, Clone, Copy)]
pub struct LaunchPlan<'a> {
    /// UTS hostname for the container.
    pub hostname: &'a Hostname,
    /// Provisioned root filesystem.
    pub rootfs: &'a Path,
    /// Command line of the init process.
    pub shell: &'a [String],
    /// Boundary the container joins, if a limit was requested.
    pub boundary: Option<&'a ResourceBoundary>,
}

impl LaunchPlan<'_> {
    /// Converts the shell command line to C strings before any fork.
    fn argv(&self) -> Result<Vec<CString>> {
        if self.shell.is_empty() {
            return Err(BurrowError::Config {
                message: "shell command is empty".into(),
            });
        }
        self.shell
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| BurrowError::Config {
                    message: format!("shell argument {arg:?} contains a NUL byte"),
                })
            })
            .collect()
    }
}

/// Launches the container and blocks until it exits.
///
/// `SIGINT` and `SIGQUIT` are ignored by the supervisor while the container
/// runs, so a Ctrl+C at the terminal reaches only the shell.
///
/// # Errors
///
/// Returns `BurrowError::Namespace` labeled with the failing stage if any
/// step between fork and exec fails, or if the child cannot be reaped.
#[cfg(target_os = "linux")]
pub fn supervise(plan: &LaunchPlan<'_>) -> Result<ExitOutcome> {
    use nix::fcntl::OFlag;
    use nix::unistd::{ForkResult, fork, pipe2};

    let argv = plan.argv()?;
    let (reader, writer) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| BurrowError::namespace(LaunchStage::Fork, e))?;

    // SAFETY: the child only runs the launch sequence and leaves through
    // `_exit` or `execvp`; it never unwinds back into the caller.
    match unsafe { fork() }.map_err(|e| BurrowError::namespace(LaunchStage::Fork, e))? {
        ForkResult::Child => {
            drop(reader);
            linux::run_intermediate(plan, &argv, std::fs::File::from(writer))
        }
        ForkResult::Parent { child } => {
            drop(writer);
            let _interrupts = linux::InterruptGuard::ignore();
            tracing::debug!(pid = child.as_raw(), "intermediate process forked");
            let report = linux::read_report(std::fs::File::from(reader));
            let outcome = linux::wait_for(child);
            if let Some(failure) = report? {
                return Err(failure.into());
            }
            outcome
        }
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn supervise(_plan: &LaunchPlan<'_>) -> Result<ExitOutcome> {
    Err(BurrowError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::fs::File;
    use std::io::{Read, Write};

    use nix::errno::Errno;
    use nix::sys::resource::{Resource, setrlimit};
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::{ForkResult, Pid, fork};

    use burrow_common::error::{BurrowError, Result};
    use burrow_common::types::LaunchStage;
    use burrow_core::filesystem::chroot::enter_root;
    use burrow_core::filesystem::mount::mount_essential_filesystems;
    use burrow_core::namespace::NamespaceSet;
    use burrow_core::namespace::mount::make_mounts_private;
    use burrow_core::namespace::uts::set_hostname;

    use super::{ExitOutcome, LaunchFailure, LaunchPlan};

    /// Joins the boundary, unshares, forks init and relays its status.
    pub(super) fn run_intermediate(plan: &LaunchPlan<'_>, argv: &[CString], mut report: File) -> ! {
        if let Some(boundary) = plan.boundary {
            if let Err(e) = boundary.attach(std::process::id()) {
                fail(&mut report, LaunchStage::CgroupAttach, e);
            }
        }
        if let Err(e) = NamespaceSet::default().enter() {
            fail(&mut report, LaunchStage::Unshare, e);
        }

        // SAFETY: as in `supervise`; init leaves through `_exit` or `execvp`.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => run_init(plan, argv, report),
            Ok(ForkResult::Parent { child }) => {
                drop(report);
                let _interrupts = InterruptGuard::ignore();
                match wait_for(child) {
                    Ok(outcome) => relay_exit(outcome),
                    Err(_) => exit(1),
                }
            }
            Err(e) => fail(
                &mut report,
                LaunchStage::Fork,
                BurrowError::namespace(LaunchStage::Fork, e),
            ),
        }
    }

    /// PID 1 of the container.
    fn run_init(plan: &LaunchPlan<'_>, argv: &[CString], mut report: File) -> ! {
        if let Err(e) = isolate(plan) {
            fail(&mut report, LaunchStage::Exec, e);
        }
        let Err(errno) = nix::unistd::execvp(&argv[0], argv);
        fail(
            &mut report,
            LaunchStage::Exec,
            BurrowError::namespace(LaunchStage::Exec, format!("{}: {errno}", plan.shell[0])),
        )
    }

    fn isolate(plan: &LaunchPlan<'_>) -> Result<()> {
        make_mounts_private()?;
        set_hostname(plan.hostname)?;
        enter_root(plan.rootfs)?;
        mount_essential_filesystems()
    }

    fn fail(report: &mut File, fallback: LaunchStage, err: BurrowError) -> ! {
        let failure = LaunchFailure::from_error(fallback, err);
        if let Ok(payload) = serde_json::to_vec(&failure) {
            let _ = report.write_all(&payload);
        }
        exit(1)
    }

    /// Ends the intermediate the way init ended: same exit status, or death
    /// by the same signal. Falls back to `128 + signal` if the signal does
    /// not terminate the process.
    pub(super) fn relay_exit(outcome: ExitOutcome) -> ! {
        if let ExitOutcome::Signaled(signal) = outcome {
            // Init already dumped core if its signal asked for one.
            let _ = setrlimit(Resource::RLIMIT_CORE, 0, 0);
            // SAFETY: restoring the default disposition installs no handler.
            let _ = unsafe { nix::sys::signal::signal(signal, SigHandler::SigDfl) };
            let mut pending = SigSet::empty();
            pending.add(signal);
            let _ = pending.thread_unblock();
            let _ = nix::sys::signal::raise(signal);
        }
        exit(i32::from(outcome.code()))
    }

    /// Ignores `SIGINT` and `SIGQUIT` until dropped, then restores the
    /// previous dispositions.
    pub(super) struct InterruptGuard {
        saved: [Option<(Signal, SigAction)>; 2],
    }

    impl InterruptGuard {
        pub(super) fn ignore() -> Self {
            let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
            let saved = [Signal::SIGINT, Signal::SIGQUIT].map(|signal| {
                // SAFETY: `SIG_IGN` runs no code in signal context.
                unsafe { sigaction(signal, &ignore) }
                    .ok()
                    .map(|previous| (signal, previous))
            });
            Self { saved }
        }
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            for (signal, previous) in self.saved.iter().flatten() {
                // SAFETY: reinstalls the disposition that was active before.
                let _ = unsafe { sigaction(*signal, previous) };
            }
        }
    }

    fn exit(code: i32) -> ! {
        // SAFETY: `_exit` skips atexit handlers and stdio flushing, both of
        // which belong to the supervisor's copy of the process state.
        unsafe { libc::_exit(code) }
    }

    /// Drains the report pipe until every writer has exited or exec'd.
    pub(super) fn read_report(mut reader: File) -> Result<Option<LaunchFailure>> {
        let mut payload = Vec::new();
        let _ = reader
            .read_to_end(&mut payload)
            .map_err(|e| BurrowError::namespace(LaunchStage::Wait, e))?;
        if payload.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| BurrowError::namespace(LaunchStage::Wait, format!("malformed launch report: {e}")))
    }

    /// Reaps `pid`, retrying on `EINTR`.
    pub(super) fn wait_for(pid: Pid) -> Result<ExitOutcome> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitOutcome::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ExitOutcome::Signaled(signal)),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(BurrowError::namespace(LaunchStage::Wait, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal;

    use super::*;

    #[test]
    fn exit_codes_follow_shell_conventions() {
        assert_eq!(ExitOutcome::Exited(0).code(), 0);
        assert_eq!(ExitOutcome::Exited(3).code(), 3);
        assert_eq!(ExitOutcome::Signaled(Signal::SIGKILL).code(), 137);
        assert_eq!(ExitOutcome::Signaled(Signal::SIGINT).code(), 130);
        assert!(ExitOutcome::Exited(0).success());
        assert!(!ExitOutcome::Signaled(Signal::SIGTERM).success());
    }

    #[test]
    fn failure_keeps_namespace_stage() {
        let err = BurrowError::namespace(LaunchStage::Mount("/proc".into()), "EPERM");
        let failure = LaunchFailure::from_error(LaunchStage::Exec, err);
        assert_eq!(failure.stage, LaunchStage::Mount("/proc".into()));
        assert_eq!(failure.message, "EPERM");
    }

    #[test]
    fn failure_falls_back_for_foreign_errors() {
        let err = BurrowError::io(
            "/sys/fs/cgroup/burrow_x/cgroup.procs",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let failure = LaunchFailure::from_error(LaunchStage::CgroupAttach, err);
        assert_eq!(failure.stage, LaunchStage::CgroupAttach);
        assert!(failure.message.contains("cgroup.procs"));
    }

    #[test]
    fn failure_report_round_trips_through_json() {
        let failure = LaunchFailure {
            stage: LaunchStage::Sethostname,
            message: "Operation not permitted".into(),
        };
        let wire = serde_json::to_string(&failure).unwrap();
        assert_eq!(
            serde_json::from_str::<LaunchFailure>(&wire).unwrap(),
            failure
        );
        let err: BurrowError = failure.into();
        assert_eq!(
            err.to_string(),
            "namespace setup failed at sethostname: Operation not permitted"
        );
    }

    #[test]
    fn argv_rejects_empty_and_nul() {
        let hostname = Hostname::parse("box").unwrap();
        let mut plan = LaunchPlan {
            hostname: &hostname,
            rootfs: Path::new("/tmp"),
            shell: &[],
            boundary: None,
        };
        assert!(matches!(plan.argv(), Err(BurrowError::Config { .. })));

        let bad = ["/bin/sh".to_string(), "a\0b".to_string()];
        plan.shell = &bad;
        assert!(plan.argv().is_err());

        let good = ["/bin/sh".to_string(), "-c".to_string(), "true".to_string()];
        plan.shell = &good;
        assert_eq!(plan.argv().unwrap().len(), 3);
    }

    /// Forks a child that ends through `relay_exit` and reaps it.
    #[cfg(target_os = "linux")]
    fn relayed(outcome: ExitOutcome) -> ExitOutcome {
        use nix::unistd::{ForkResult, fork};

        // SAFETY: the child only adjusts signal state and calls `_exit`.
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => linux::relay_exit(outcome),
            ForkResult::Parent { child } => linux::wait_for(child).unwrap(),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn intermediate_dies_of_the_signal_that_killed_init() {
        assert_eq!(
            relayed(ExitOutcome::Signaled(Signal::SIGTERM)),
            ExitOutcome::Signaled(Signal::SIGTERM)
        );
        assert_eq!(
            relayed(ExitOutcome::Signaled(Signal::SIGKILL)),
            ExitOutcome::Signaled(Signal::SIGKILL)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn intermediate_relays_plain_exit_codes() {
        assert_eq!(relayed(ExitOutcome::Exited(0)), ExitOutcome::Exited(0));
        assert_eq!(relayed(ExitOutcome::Exited(7)), ExitOutcome::Exited(7));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn interrupt_guard_ignores_then_restores() {
        use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, sigaction};

        let guard = linux::InterruptGuard::ignore();
        // Would terminate the test binary if the guard did not hold.
        nix::sys::signal::raise(Signal::SIGQUIT).unwrap();
        drop(guard);

        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        // SAFETY: `SIG_DFL` runs no code in signal context.
        let restored = unsafe { sigaction(Signal::SIGQUIT, &default) }.unwrap();
        assert_eq!(restored.handler(), SigHandler::SigDfl);
    }
}

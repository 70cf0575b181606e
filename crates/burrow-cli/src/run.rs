//! `burrow <hostname>`: launch the container and wait for it.

use std::process::ExitCode;
use std::time::Instant;

use burrow_common::types::ContainerSpec;
use burrow_runtime::container::Container;
use burrow_runtime::process::ExitOutcome;

use crate::cli::Cli;
use crate::output::{BOLD, CYAN, DIM, GREEN, RESET, YELLOW, format_bytes};

/// Launches the container described by `cli` and returns its exit code.
///
/// # Errors
///
/// Returns an error if the arguments are invalid or the launch fails.
pub fn execute(cli: &Cli) -> anyhow::Result<ExitCode> {
    let spec = cli.container_spec()?;
    let config = cli.runtime_config()?;

    print_header(&spec);
    tracing::debug!(
        image = %config.base_image.display(),
        rootfs_dir = %config.rootfs_dir.display(),
        "launching"
    );

    let started = Instant::now();
    let mut container = Container::new(spec, config);
    let outcome = container.launch()?;
    print_exit(outcome, started);

    Ok(ExitCode::from(outcome.code()))
}

fn print_header(spec: &ContainerSpec) {
    let limit = spec
        .memory_limit()
        .map_or_else(|| "unlimited".to_string(), |l| format_bytes(l.bytes()));
    eprintln!();
    eprintln!("  {BOLD}burrow{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("    {CYAN}hostname{RESET}  {BOLD}{}{RESET}", spec.hostname());
    eprintln!("    {CYAN}instance{RESET}  {DIM}{}{RESET}", spec.instance_id());
    eprintln!("    {CYAN}memory{RESET}    {limit}");
    eprintln!();
}

fn print_exit(outcome: ExitOutcome, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    eprintln!();
    match outcome {
        ExitOutcome::Exited(0) => {
            eprintln!("  {GREEN}Container exited{RESET} after {elapsed:.1}s");
        }
        ExitOutcome::Exited(code) => {
            eprintln!("  {YELLOW}Container exited with code {code}{RESET} after {elapsed:.1}s");
        }
        ExitOutcome::Signaled(signal) => {
            eprintln!(
                "  {YELLOW}Container killed by {signal}{RESET} after {elapsed:.1}s {DIM}(exit code {}){RESET}",
                outcome.code()
            );
        }
    }
}

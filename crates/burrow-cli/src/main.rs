//! # burrow
//!
//! Launches one interactive shell inside fresh UTS, PID, mount and network
//! namespaces, chrooted into a private copy of a base image, optionally
//! under a cgroup memory ceiling.

#![allow(clippy::print_stderr)]

mod cli;
mod output;
mod run;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;
use crate::output::{BOLD, RED, RESET};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run::execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  {RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

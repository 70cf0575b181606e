//! # burrow-core
//!
//! Low-level Linux isolation primitives for the burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Cgroups**: per-instance memory boundaries on v1 or v2 hierarchies.
//! - **Namespaces**: UTS, PID, mount and network isolation.
//! - **Filesystem**: `chroot` and the `/proc`, `/sys`, `/dev` mounts.
//!
//! Every syscall goes through `nix`; failures inside the launch sequence
//! carry the [`burrow_common::types::LaunchStage`] they happened in.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;

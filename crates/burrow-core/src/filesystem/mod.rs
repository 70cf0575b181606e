//! Filesystem management for container isolation.
//!
//! Provides the chroot boundary change and the pseudo-filesystem mounts
//! the new root needs.

pub mod chroot;
pub mod mount;

//! # burrow-image
//!
//! Root filesystem provisioning for the burrow runtime.
//!
//! Handles:
//! - **Layers**: unpacking the shared base image archive.
//! - **Injection**: copying host files such as `resolv.conf` into a rootfs.
//! - **Provisioning**: one private rootfs per container instance.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod inject;
pub mod layer;
pub mod provision;

//! # burrow-status
//!
//! A small HTTP/1.1 service exposing one mutable status string at
//! `/api/v1/status`, used to report on hosts running burrow containers.
//!
//! - `GET` returns `{"status": <current>}`.
//! - `POST` with a JSON object carrying a `status` key replaces it and
//!   echoes the body with `201 Created`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod http;
pub mod routes;
pub mod server;
pub mod store;

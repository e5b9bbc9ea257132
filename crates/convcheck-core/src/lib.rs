//! # convcheck-core
//!
//! Low-level harness primitives shared by every verification stage.
//!
//! This crate provides:
//! - **Executor**: runs an external tool with a deadline, capturing both
//!   output streams and applying a success policy.
//! - **Diagnostics**: the per-fixture bundle of captured tool output that is
//!   written to disk only when the fixture fails.
//! - **Runner**: binds the executor to one fixture's diagnostic bundle.
//! - **Mount**: platform mount backends and the scope guard that guarantees
//!   every mount is released exactly once.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod diagnostics;
pub mod exec;
pub mod mount;
pub mod runner;

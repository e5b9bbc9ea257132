//! # convcheck-fixture
//!
//! Fixture catalog for the conversion-verification harness.
//!
//! Handles:
//! - **Sources**: classifying a fixture as a prebuilt image or a generation
//!   recipe, in both the directory and the flat-file layout.
//! - **Naming**: deriving a unique, identifier-safe test name per fixture.
//! - **Catalog**: walking a fixtures root and registering one test case per
//!   fixture.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod catalog;
pub mod naming;
pub mod source;

//! Conversion-verification pipeline and suite runner.
//!
//! Ties the harness primitives together: each registered fixture runs
//! through the [`pipeline`], judged by the [`oracle`] policies, and the
//! [`suite`] aggregates outcomes into a [`report`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod oracle;
pub mod pipeline;
pub mod preflight;
pub mod report;
pub mod suite;

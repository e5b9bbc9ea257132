//! Fixture-bound tool runner.

use std::time::Duration;

use convcheck_common::error::Result;

use crate::diagnostics::DiagnosticBundle;
use crate::exec::{Executor, ToolInvocation, ToolResult};

/// Runs tools on behalf of one fixture, retaining their output.
///
/// Every stage of a fixture's pipeline goes through the same runner so the
/// fixture's diagnostic bundle sees every tool that ran.
#[derive(Debug)]
pub struct ToolRunner {
    executor: Executor,
    default_deadline: Duration,
    bundle: DiagnosticBundle,
}

impl ToolRunner {
    /// Creates a runner feeding `bundle`.
    #[must_use]
    pub const fn new(executor: Executor, default_deadline: Duration, bundle: DiagnosticBundle) -> Self {
        Self {
            executor,
            default_deadline,
            bundle,
        }
    }

    /// Runs the invocation, records its output, then judges it.
    ///
    /// Output is recorded before judging, so a failing or timed-out tool
    /// still leaves its streams in the bundle.
    ///
    /// # Errors
    ///
    /// Returns spawn/wait failures from the executor, or the verdict of the
    /// invocation's success policy.
    pub fn run(&mut self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let deadline = invocation.deadline().unwrap_or(self.default_deadline);
        let captured = self.executor.execute(invocation, deadline)?;
        self.bundle.record(&captured.result);
        invocation.judge(&captured)?;
        Ok(captured.result)
    }

    /// The executor used for every invocation.
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Deadline applied when an invocation has none.
    #[must_use]
    pub const fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    /// Output retained so far.
    #[must_use]
    pub const fn bundle(&self) -> &DiagnosticBundle {
        &self.bundle
    }

    /// Consumes the runner, yielding its bundle.
    #[must_use]
    pub fn into_bundle(self) -> DiagnosticBundle {
        self.bundle
    }
}

#[cfg(all(test, unix))]
mod tests {
    use convcheck_common::error::HarnessError;

    use super::*;

    fn runner(dir: &std::path::Path) -> ToolRunner {
        ToolRunner::new(
            Executor::default(),
            Duration::from_secs(5),
            DiagnosticBundle::new(dir, "case."),
        )
    }

    #[test]
    fn failing_tool_output_is_still_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = runner(dir.path());

        let err = runner
            .run(&ToolInvocation::shell("gen script", "echo nope >&2; exit 2"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnexpectedExit { code: 2, .. }));

        let entries = runner.bundle().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].0.ends_with("case.gen-script.err.txt"));
        assert_eq!(entries[0].1, b"nope\n");
    }

    #[test]
    fn default_deadline_applies_without_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = ToolRunner::new(
            Executor::default(),
            Duration::from_millis(200),
            DiagnosticBundle::new(dir.path(), ""),
        );
        let err = runner
            .run(&ToolInvocation::exec("sleep", "sleep", ["10"]))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }));
    }

    #[test]
    fn per_invocation_deadline_overrides_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = ToolRunner::new(
            Executor::default(),
            Duration::from_millis(50),
            DiagnosticBundle::new(dir.path(), ""),
        );
        let result = runner
            .run(
                &ToolInvocation::shell("short sleep", "sleep 0.2; echo ok")
                    .with_deadline(Duration::from_secs(5)),
            )
            .expect("run");
        assert_eq!(result.stdout, b"ok\n");
    }
}

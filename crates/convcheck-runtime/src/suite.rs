//! Test registration and suite execution.
//!
//! The registration list is built once at startup: every discovered
//! fixture becomes a named test case bound to the same pipeline. Test cases
//! are independent; a failing one never stops the others unless the run is
//! configured to fail fast.

use std::sync::Arc;

use convcheck_common::config::HarnessConfig;
use convcheck_common::error::Result;
use convcheck_core::mount::MountBackend;
use convcheck_fixture::catalog::{Catalog, TestCase};

use crate::pipeline::{FixtureOutcome, Pipeline};
use crate::report::RunReport;

/// Registered test cases plus the pipeline that runs them.
#[derive(Debug)]
pub struct Suite {
    config: HarnessConfig,
    cases: Vec<TestCase>,
    pipeline: Pipeline,
}

impl Suite {
    /// Discovers fixtures under the configured root and registers them,
    /// keeping only names matching the configured filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the fixtures root
    /// cannot be walked.
    pub fn discover(config: HarnessConfig, backend: Arc<dyn MountBackend>) -> Result<Self> {
        config.validate()?;
        let mut catalog = Catalog::discover(&config.fixtures_root)?;
        if let Some(filter) = config.filter.as_deref() {
            catalog.retain_matching(filter);
            tracing::info!(filter, selected = catalog.len(), "fixtures filtered");
        }
        let pipeline = Pipeline::new(&config, backend);
        Ok(Self {
            config,
            cases: catalog.into_cases(),
            pipeline,
        })
    }

    /// Registered test cases in execution order.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Runs every registered test case.
    #[must_use]
    pub fn run(&self) -> RunReport {
        self.run_with(|_| {})
    }

    /// Runs every registered test case, handing each outcome to
    /// `on_outcome` as soon as it is known.
    pub fn run_with<F>(&self, mut on_outcome: F) -> RunReport
    where
        F: FnMut(&FixtureOutcome),
    {
        let mut report = RunReport::new(&self.config.converter, &self.config.fixtures_root);
        tracing::info!(run_id = %report.run_id, tests = self.cases.len(), "run started");

        for (index, case) in self.cases.iter().enumerate() {
            let outcome = self.pipeline.run(case);
            on_outcome(&outcome);
            report.record(&outcome);

            if !outcome.passed() && self.config.fail_fast {
                report.not_run = self.cases[index + 1..]
                    .iter()
                    .map(|c| c.name.clone())
                    .collect();
                tracing::warn!(skipped = report.not_run.len(), "stopping after first failure");
                break;
            }
        }

        tracing::info!(
            run_id = %report.run_id,
            passed = report.passed(),
            failed = report.failed(),
            "run finished"
        );
        report
    }
}

//! Machine-readable summary of a harness run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use convcheck_common::error::{HarnessError, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::{FixtureOutcome, Stage};

/// Serialisable record of one fixture's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    /// Test name.
    pub name: String,
    /// Fixture path.
    pub fixture: PathBuf,
    /// `true` when the fixture passed.
    pub passed: bool,
    /// Stage the failure occurred in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostic artifacts written on failure.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    /// Pipeline duration in milliseconds.
    pub elapsed_ms: u64,
}

impl From<&FixtureOutcome> for OutcomeRecord {
    fn from(outcome: &FixtureOutcome) -> Self {
        let failure = outcome.failure.as_ref();
        Self {
            name: outcome.name.clone(),
            fixture: outcome.fixture.clone(),
            passed: failure.is_none(),
            failed_stage: failure.map(|f| f.stage),
            error: failure.map(|f| f.error.to_string()),
            artifacts: failure.map(|f| f.artifacts.clone()).unwrap_or_default(),
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Converter under test.
    pub converter: PathBuf,
    /// Fixtures root searched.
    pub fixtures_root: PathBuf,
    /// Outcomes in execution order.
    pub outcomes: Vec<OutcomeRecord>,
    /// Registered tests that never ran because the run stopped early.
    pub not_run: Vec<String>,
}

impl RunReport {
    /// Starts an empty report.
    #[must_use]
    pub fn new(converter: &Path, fixtures_root: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            converter: converter.to_path_buf(),
            fixtures_root: fixtures_root.to_path_buf(),
            outcomes: Vec::new(),
            not_run: Vec::new(),
        }
    }

    /// Appends a fixture outcome.
    pub fn record(&mut self, outcome: &FixtureOutcome) {
        self.outcomes.push(OutcomeRecord::from(outcome));
    }

    /// Number of passing fixtures.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Number of failing fixtures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Returns whether every fixture that ran passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| HarnessError::io(path, e))?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }
}

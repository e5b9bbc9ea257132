//! Terminal output for fixture results and the run summary.

use std::fmt::Write as _;
use std::time::Duration;

use convcheck_runtime::pipeline::FixtureOutcome;
use convcheck_runtime::report::RunReport;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Formats a duration as milliseconds below one second, else seconds.
#[must_use]
pub fn format_duration(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// Renders one fixture result: a status line, then for failures the stage,
/// error, and artifact paths.
#[must_use]
pub fn format_outcome(outcome: &FixtureOutcome) -> String {
    let elapsed = format_duration(outcome.elapsed);
    let Some(failure) = &outcome.failure else {
        return format!("  {GREEN}PASS{RESET} {} {DIM}({elapsed}){RESET}", outcome.name);
    };

    let mut text = format!(
        "  {RED}{BOLD}FAIL{RESET} {} {DIM}({elapsed}){RESET}\n       {}: {}",
        outcome.name, failure.stage, failure.error
    );
    if failure.error.touches_mounts() {
        let _ = write!(
            text,
            "\n       {YELLOW}hint:{RESET} run `mount` and unmount anything left under the temp dir"
        );
    }
    for artifact in &failure.artifacts {
        let _ = write!(text, "\n       {DIM}{}{RESET}", artifact.display());
    }
    text
}

/// Renders the closing summary line.
#[must_use]
pub fn format_summary(report: &RunReport) -> String {
    let mut text = format!("{} passed, {} failed", report.passed(), report.failed());
    if !report.not_run.is_empty() {
        let _ = write!(text, ", {} not run", report.not_run.len());
    }
    let colour = if report.success() { GREEN } else { RED };
    format!("  {colour}{BOLD}{text}{RESET}")
}

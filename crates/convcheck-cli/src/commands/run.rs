//! `convcheck`: run every registered fixture and report.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use convcheck_common::config::HarnessConfig;
use convcheck_common::constants::APP_NAME;
use convcheck_core::mount::detect_backend;
use convcheck_runtime::preflight;
use convcheck_runtime::suite::Suite;

use super::Cli;
use crate::output;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Runs the suite, prints each result as it completes, and writes the
/// optional JSON report.
///
/// Returns exit code 1 when any fixture failed.
///
/// # Errors
///
/// Returns an error if preflight or discovery fails, or the report cannot
/// be written.
pub fn execute(config: HarnessConfig, cli: &Cli) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let backend = detect_backend(&config.tools)?;
    if cli.skip_preflight {
        tracing::warn!("preflight checks skipped");
    } else {
        preflight::check(&config, backend.as_ref()).context("preflight failed")?;
    }

    let suite = Suite::discover(config, Arc::clone(&backend))?;
    print_header(suite.cases().len(), backend.name());

    let report = suite.run_with(|outcome| eprintln!("{}", output::format_outcome(outcome)));

    eprintln!();
    eprintln!("{}", output::format_summary(&report));
    eprintln!(
        "  {DIM}finished in {}{RESET}",
        output::format_duration(started.elapsed())
    );

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_header(tests: usize, backend: &str) {
    eprintln!();
    eprintln!(
        "  {BOLD}{APP_NAME}{RESET} {DIM}v{} ({backend} mounts){RESET}",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("  running {tests} test(s)");
    eprintln!();
}

//! `convcheck --list`: print the registered tests without running them.

use std::process::ExitCode;

use convcheck_common::config::HarnessConfig;
use convcheck_core::mount::detect_backend;
use convcheck_runtime::suite::Suite;

/// Discovers fixtures and prints one `name<TAB>path` line per test.
///
/// # Errors
///
/// Returns an error if the platform is unsupported or discovery fails.
pub fn execute(config: HarnessConfig) -> anyhow::Result<ExitCode> {
    let backend = detect_backend(&config.tools)?;
    let suite = Suite::discover(config, backend)?;
    for case in suite.cases() {
        println!("{}\t{}", case.name, case.fixture.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

//! CLI argument definitions and dispatch.

pub mod list;
pub mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use convcheck_common::config::HarnessConfig;
use convcheck_common::constants::{BIN_NAME, ENV_CONVERTER, ENV_FIXTURES_ROOT};

/// Verifies a FAT to ext4 converter against a directory of fixtures.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Converter executable under test.
    #[arg(env = ENV_CONVERTER)]
    pub converter: PathBuf,

    /// Directory searched recursively for fixtures.
    #[arg(env = ENV_FIXTURES_ROOT)]
    pub fixtures_root: PathBuf,

    /// Only run tests whose name contains this substring.
    #[arg(long)]
    pub filter: Option<String>,

    /// Print the registered test names and exit.
    #[arg(long)]
    pub list: bool,

    /// Stop after the first failing fixture.
    #[arg(long)]
    pub fail_fast: bool,

    /// Per-tool deadline in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write a JSON run report to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// JSON configuration file; command-line flags take precedence.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Skip the host tool and privilege checks.
    #[arg(long)]
    pub skip_preflight: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Builds the run configuration: the config file (if any) overlaid with
    /// command-line values.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the merged
    /// configuration is invalid.
    pub fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HarnessConfig::default(),
        };
        config.converter.clone_from(&self.converter);
        config.fixtures_root.clone_from(&self.fixtures_root);
        if let Some(secs) = self.timeout {
            config.tool_timeout_secs = secs;
        }
        if self.filter.is_some() {
            config.filter.clone_from(&self.filter);
        }
        config.fail_fast |= self.fail_fast;
        config.validate()?;
        Ok(config)
    }
}

/// Dispatches the parsed command line.
///
/// # Errors
///
/// Returns an error for configuration, preflight, or discovery failures.
/// Fixture failures are reported through the exit code instead.
pub fn execute(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = cli.harness_config()?;
    if cli.list {
        list::execute(config)
    } else {
        run::execute(config, cli)
    }
}

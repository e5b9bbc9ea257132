//! Host checks run once before any fixture.

use std::path::PathBuf;

use convcheck_common::config::HarnessConfig;
use convcheck_common::error::{HarnessError, Result};
use convcheck_core::mount::MountBackend;

/// External tools a run needs with this configuration and backend.
#[must_use]
pub fn required_tools(config: &HarnessConfig, backend: &dyn MountBackend) -> Vec<PathBuf> {
    let mut tools = vec![
        config.tools.shell.clone(),
        config.tools.mkfs_fat.clone(),
        config.tools.fsck_ext4.clone(),
        config.tools.rsync.clone(),
    ];
    tools.extend(backend.required_tools());
    tools.dedup();
    tools
}

/// Tools from `tools` that cannot be resolved to an executable.
#[must_use]
pub fn missing_tools(tools: &[PathBuf]) -> Vec<PathBuf> {
    tools
        .iter()
        .filter(|tool| which::which(tool.as_path()).is_err())
        .cloned()
        .collect()
}

/// Verifies the converter and every external tool are present.
///
/// Also warns when loop mounts are likely to be refused for lack of
/// privileges.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] naming the converter or every missing
/// tool.
pub fn check(config: &HarnessConfig, backend: &dyn MountBackend) -> Result<()> {
    if !config.converter.is_file() {
        return Err(HarnessError::Config {
            message: format!("converter {} is not a file", config.converter.display()),
        });
    }

    let missing = missing_tools(&required_tools(config, backend));
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(HarnessError::Config {
            message: format!("required tools not found: {names}"),
        });
    }

    warn_if_unprivileged(backend);
    tracing::debug!(backend = backend.name(), "preflight passed");
    Ok(())
}

#[cfg(target_os = "linux")]
fn warn_if_unprivileged(backend: &dyn MountBackend) {
    if !nix::unistd::geteuid().is_root() {
        tracing::warn!(
            backend = backend.name(),
            "not running as root; loop mounts will probably fail"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn warn_if_unprivileged(_backend: &dyn MountBackend) {}

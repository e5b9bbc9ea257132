//! Harness configuration model.
//!
//! The converter path and fixtures root come from the command line or the
//! environment; everything else has defaults that an optional JSON file can
//! override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Root configuration for one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Conversion tool under test.
    pub converter: PathBuf,
    /// Directory searched recursively for fixtures.
    pub fixtures_root: PathBuf,
    /// Deadline applied to every tool invocation, in seconds.
    pub tool_timeout_secs: u64,
    /// Names or paths of the external collaborators.
    pub tools: ToolPaths,
    /// Only run fixtures whose test name contains this substring.
    pub filter: Option<String>,
    /// Stop after the first failing fixture.
    pub fail_fast: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            converter: PathBuf::new(),
            fixtures_root: PathBuf::new(),
            tool_timeout_secs: crate::constants::DEFAULT_TOOL_TIMEOUT_SECS,
            tools: ToolPaths::default(),
            filter: None,
            fail_fast: false,
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration for the given converter and fixtures root.
    #[must_use]
    pub fn new(converter: impl Into<PathBuf>, fixtures_root: impl Into<PathBuf>) -> Self {
        Self {
            converter: converter.into(),
            fixtures_root: fixtures_root.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the per-tool deadline.
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Checks values that would make every fixture fail for a
    /// configuration reason rather than a converter bug.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(HarnessError::Config {
                message: "tool_timeout_secs must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Executables the harness drives. Bare names are resolved through `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// FAT formatter.
    pub mkfs_fat: PathBuf,
    /// ext4 structural checker.
    pub fsck_ext4: PathBuf,
    /// Checksum-based tree diff.
    pub rsync: PathBuf,
    /// Loop mount utility (Linux).
    pub mount: PathBuf,
    /// Unmount utility.
    pub umount: PathBuf,
    /// Disk image attach/eject utility (macOS).
    pub hdiutil: PathBuf,
    /// User-space ext4 driver (macOS).
    pub ext4fuse: PathBuf,
    /// Shell used for shell-string invocations.
    pub shell: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mkfs_fat: PathBuf::from("mkfs.fat"),
            fsck_ext4: PathBuf::from("fsck.ext4"),
            rsync: PathBuf::from("rsync"),
            mount: PathBuf::from("mount"),
            umount: PathBuf::from("umount"),
            hdiutil: PathBuf::from("hdiutil"),
            ext4fuse: PathBuf::from("ext4fuse"),
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

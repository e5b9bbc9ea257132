//! Unified error types for the convcheck workspace.
//!
//! Every harness stage reports failures through [`HarnessError`]. A failure
//! aborts the fixture it occurred in; the suite records it and moves on to
//! the next fixture.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A tool did not terminate before its deadline and was killed.
    #[error("{tool} timed out after {}s", deadline.as_secs_f64())]
    Timeout {
        /// Name of the tool that timed out.
        tool: String,
        /// Deadline the tool exceeded.
        deadline: Duration,
    },

    /// A tool exited with a non-zero code where zero was required.
    #[error("{message} (exit code {code})")]
    UnexpectedExit {
        /// Name of the tool.
        tool: String,
        /// Exit code, `-1` when the process was killed by a signal.
        code: i32,
        /// Human-readable failure description.
        message: String,
    },

    /// A tool could not be started at all.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        /// Name of the tool.
        tool: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The structural checker found real corruption or exited abnormally.
    #[error("{message} (exit code {code})")]
    StructuralCheckFailure {
        /// Raw checker exit code.
        code: i32,
        /// Whether the checker reported errors or exited unexpectedly.
        message: String,
    },

    /// The content diff reported differences between the two trees.
    #[error("rsync reported differences between FAT and ext4 images ({changes} entries differ)")]
    ContentMismatch {
        /// Number of itemized change lines reported.
        changes: usize,
    },

    /// The formatter warned that the fixture is under-provisioned.
    #[error("too few clusters specified for FAT32: {warning}")]
    FormatWarning {
        /// The warning text matched on the formatter's stderr.
        warning: String,
    },

    /// Attaching an image failed.
    #[error("mounting {} at {} failed: {detail}; check for stale mounts", image.display(), mount_point.display())]
    Mount {
        /// Image being mounted.
        image: PathBuf,
        /// Target mount point.
        mount_point: PathBuf,
        /// The mount utility was killed at its deadline, so the mount may
        /// have completed anyway.
        timed_out: bool,
        /// Description of the failure.
        detail: String,
    },

    /// Releasing a mount failed.
    #[error("releasing mount at {} failed: {detail}; check for stale mounts", mount_point.display())]
    Unmount {
        /// Mount point that could not be released.
        mount_point: PathBuf,
        /// Description of the failure.
        detail: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The host has no supported mount mechanism.
    #[error("no mount backend for host platform {os}; only Linux and macOS are supported")]
    UnsupportedPlatform {
        /// Host operating system name.
        os: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HarnessError {
    /// Builds an [`HarnessError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns whether this failure may have left host mount state behind.
    #[must_use]
    pub const fn touches_mounts(&self) -> bool {
        matches!(self, Self::Mount { .. } | Self::Unmount { .. })
    }

    /// Returns whether a mount may still be live after this failure: a
    /// release failed, or an attach was cut off at its deadline.
    ///
    /// An attach that exited with an error never mounted anything.
    #[must_use]
    pub const fn may_leave_mount_live(&self) -> bool {
        matches!(
            self,
            Self::Unmount { .. } | Self::Mount { timed_out: true, .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HarnessError>;

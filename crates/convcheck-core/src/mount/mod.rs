//! Image mount backends and the scoped mount manager.
//!
//! A backend knows how to attach a volume image to a directory and how to
//! release it again on one host platform. [`detect_backend`] picks the
//! backend once at startup; [`ImageMounter`] wraps it so every mount is
//! released exactly once on every exit path.

pub mod disk_image;
pub mod loopback;
pub mod scope;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use convcheck_common::config::ToolPaths;
use convcheck_common::error::Result;
use convcheck_common::types::{Access, FsKind};

use crate::runner::ToolRunner;

pub use scope::{ImageMounter, MountGuard};

/// What to mount and where.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    /// Volume image to attach.
    pub image: &'a Path,
    /// Filesystem the image holds.
    pub kind: FsKind,
    /// Read-only or read-write.
    pub access: Access,
    /// Existing, empty directory to mount on.
    pub mount_point: &'a Path,
}

/// How a live mount must be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Plain `umount` of the mount point.
    Unmount,
    /// Detach the attached disk image (`hdiutil eject`).
    Eject,
}

/// Platform mount capability.
///
/// Implementors run the host's mount utilities through the fixture's
/// [`ToolRunner`], so their output joins the fixture's diagnostics.
pub trait MountBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// External executables this backend invokes.
    fn required_tools(&self) -> Vec<PathBuf>;

    /// Names the backend gives its tool invocations, and so the names its
    /// diagnostic artifacts carry.
    fn tool_names(&self) -> Vec<&'static str>;

    /// Attaches the image, returning how to release it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Mount`](convcheck_common::error::HarnessError::Mount)
    /// if the mount utility fails or times out.
    fn attach(&self, runner: &mut ToolRunner, request: &MountRequest<'_>) -> Result<Release>;

    /// Releases a mount previously returned by [`MountBackend::attach`].
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Unmount`](convcheck_common::error::HarnessError::Unmount)
    /// if the release utility fails or times out.
    fn detach(&self, runner: &mut ToolRunner, mount_point: &Path, release: Release) -> Result<()>;
}

/// Selects the mount backend for the current platform.
///
/// # Errors
///
/// Returns [`HarnessError::UnsupportedPlatform`](convcheck_common::error::HarnessError::UnsupportedPlatform)
/// on hosts other than Linux and macOS.
pub fn detect_backend(tools: &ToolPaths) -> Result<Arc<dyn MountBackend>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(loopback::LoopBackend::new(tools)))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(disk_image::DiskImageBackend::new(tools)))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = tools;
        Err(convcheck_common::error::HarnessError::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
        })
    }
}

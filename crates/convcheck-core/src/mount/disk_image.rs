//! Disk-image attach backend for macOS.
//!
//! `hdiutil` attaches raw FAT images natively. It cannot attach ext4, so
//! ext4 images go through the `ext4fuse` user-space driver instead and are
//! released with a plain `umount`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use convcheck_common::config::ToolPaths;
use convcheck_common::error::{HarnessError, Result};
use convcheck_common::types::FsKind;

use super::{MountBackend, MountRequest, Release};
use crate::exec::ToolInvocation;
use crate::runner::ToolRunner;

/// Attaches images with `hdiutil`, falling back to `ext4fuse` for ext4.
#[derive(Debug, Clone)]
pub struct DiskImageBackend {
    hdiutil: PathBuf,
    ext4fuse: PathBuf,
    umount: PathBuf,
}

impl DiskImageBackend {
    /// Creates the backend from configured tool paths.
    #[must_use]
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            hdiutil: tools.hdiutil.clone(),
            ext4fuse: tools.ext4fuse.clone(),
            umount: tools.umount.clone(),
        }
    }

    fn attach_args(request: &MountRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "attach".into(),
            "-imagekey".into(),
            "diskimage-class=CRawDiskImage".into(),
            "-nobrowse".into(),
        ];
        if request.access.is_readonly() {
            args.push("-readonly".into());
        }
        args.push("-mountpoint".into());
        args.push(request.mount_point.into());
        args.push(request.image.into());
        args
    }

    fn invocation_for(&self, request: &MountRequest<'_>) -> (ToolInvocation, Release) {
        match request.kind {
            FsKind::Ext4 => (
                ToolInvocation::exec("ext4fuse", &self.ext4fuse, [request.image, request.mount_point])
                    .with_failure_message("ext4fuse mounting failed"),
                Release::Unmount,
            ),
            FsKind::Vfat => (
                ToolInvocation::exec("hdiutil attach", &self.hdiutil, Self::attach_args(request))
                    .with_failure_message("hdiutil attach did not exit cleanly"),
                Release::Eject,
            ),
        }
    }
}

impl MountBackend for DiskImageBackend {
    fn name(&self) -> &'static str {
        "hdiutil"
    }

    fn required_tools(&self) -> Vec<PathBuf> {
        vec![self.hdiutil.clone(), self.ext4fuse.clone(), self.umount.clone()]
    }

    fn tool_names(&self) -> Vec<&'static str> {
        vec!["hdiutil attach", "hdiutil eject", "ext4fuse", "umount"]
    }

    fn attach(&self, runner: &mut ToolRunner, request: &MountRequest<'_>) -> Result<Release> {
        let (invocation, release) = self.invocation_for(request);
        let _ = runner.run(&invocation).map_err(|e| HarnessError::Mount {
            image: request.image.to_path_buf(),
            mount_point: request.mount_point.to_path_buf(),
            timed_out: matches!(e, HarnessError::Timeout { .. }),
            detail: e.to_string(),
        })?;
        tracing::debug!(
            image = %request.image.display(),
            mount_point = %request.mount_point.display(),
            tool = invocation.name(),
            "image attached"
        );
        Ok(release)
    }

    fn detach(&self, runner: &mut ToolRunner, mount_point: &Path, release: Release) -> Result<()> {
        let invocation = match release {
            Release::Eject => ToolInvocation::exec("hdiutil eject", &self.hdiutil, [Path::new("eject"), mount_point])
                .with_failure_message("hdiutil eject did not exit cleanly"),
            Release::Unmount => ToolInvocation::exec("umount", &self.umount, [mount_point])
                .with_failure_message("umount did not exit cleanly"),
        };
        let _ = runner.run(&invocation).map_err(|e| HarnessError::Unmount {
            mount_point: mount_point.to_path_buf(),
            detail: e.to_string(),
        })?;
        tracing::debug!(mount_point = %mount_point.display(), tool = invocation.name(), "image released");
        Ok(())
    }
}

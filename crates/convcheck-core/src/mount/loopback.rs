//! Loop-device mount backend for Linux.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use convcheck_common::config::ToolPaths;
use convcheck_common::error::{HarnessError, Result};

use super::{MountBackend, MountRequest, Release};
use crate::exec::ToolInvocation;
use crate::runner::ToolRunner;

/// Mounts images through the kernel loop driver with `mount -o loop`.
///
/// The filesystem type is always passed explicitly so a damaged image is
/// never probed as something else.
#[derive(Debug, Clone)]
pub struct LoopBackend {
    mount: PathBuf,
    umount: PathBuf,
}

impl LoopBackend {
    /// Creates the backend from configured tool paths.
    #[must_use]
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            mount: tools.mount.clone(),
            umount: tools.umount.clone(),
        }
    }

    fn mount_args(request: &MountRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "loop".into(),
            "-t".into(),
            request.kind.as_str().into(),
        ];
        if request.access.is_readonly() {
            args.push("--read-only".into());
        }
        args.push(request.image.into());
        args.push(request.mount_point.into());
        args
    }
}

impl MountBackend for LoopBackend {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn required_tools(&self) -> Vec<PathBuf> {
        vec![self.mount.clone(), self.umount.clone()]
    }

    fn tool_names(&self) -> Vec<&'static str> {
        vec!["mount", "umount"]
    }

    fn attach(&self, runner: &mut ToolRunner, request: &MountRequest<'_>) -> Result<Release> {
        let invocation = ToolInvocation::exec("mount", &self.mount, Self::mount_args(request))
            .with_failure_message("mount did not exit cleanly");
        let _ = runner.run(&invocation).map_err(|e| HarnessError::Mount {
            image: request.image.to_path_buf(),
            mount_point: request.mount_point.to_path_buf(),
            timed_out: matches!(e, HarnessError::Timeout { .. }),
            detail: e.to_string(),
        })?;
        tracing::debug!(
            image = %request.image.display(),
            mount_point = %request.mount_point.display(),
            kind = %request.kind,
            "loop mounted"
        );
        Ok(Release::Unmount)
    }

    fn detach(&self, runner: &mut ToolRunner, mount_point: &Path, _release: Release) -> Result<()> {
        let invocation = ToolInvocation::exec("umount", &self.umount, [mount_point])
            .with_failure_message("umount did not exit cleanly");
        let _ = runner.run(&invocation).map_err(|e| HarnessError::Unmount {
            mount_point: mount_point.to_path_buf(),
            detail: e.to_string(),
        })?;
        tracing::debug!(mount_point = %mount_point.display(), "unmounted");
        Ok(())
    }
}

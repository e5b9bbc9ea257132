//! Scoped mounts with guaranteed single release.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use convcheck_common::constants::MOUNTS_DIR_NAME;
use convcheck_common::error::{HarnessError, Result};
use convcheck_common::types::{Access, FsKind};

use super::{MountBackend, MountRequest, Release};
use crate::diagnostics::DiagnosticBundle;
use crate::exec::Executor;
use crate::runner::ToolRunner;

/// Per-fixture mount manager.
///
/// Mount points live under `<temp dir>/mnt/<kind>`, so every fixture gets
/// its own and repeated or concurrent runs never collide.
#[derive(Debug, Clone)]
pub struct ImageMounter {
    backend: Arc<dyn MountBackend>,
    mounts_dir: PathBuf,
}

impl ImageMounter {
    /// Creates the `mnt` directory under the fixture's temp dir.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(backend: Arc<dyn MountBackend>, temp_dir: &Path) -> Result<Self> {
        let mounts_dir = temp_dir.join(MOUNTS_DIR_NAME);
        std::fs::create_dir_all(&mounts_dir).map_err(|e| HarnessError::io(&mounts_dir, e))?;
        Ok(Self {
            backend,
            mounts_dir,
        })
    }

    /// Directory holding this fixture's mount points.
    #[must_use]
    pub fn mounts_dir(&self) -> &Path {
        &self.mounts_dir
    }

    fn make_mount_point(&self, kind: FsKind) -> Result<PathBuf> {
        let mount_point = self.mounts_dir.join(kind.as_str());
        std::fs::create_dir_all(&mount_point).map_err(|e| HarnessError::io(&mount_point, e))?;
        Ok(mount_point)
    }

    /// Attaches `image` and returns a guard that must be released.
    ///
    /// Prefer [`ImageMounter::with_mount`], which releases for you.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount point cannot be created or the backend
    /// fails to attach the image.
    pub fn mount(
        &self,
        runner: &mut ToolRunner,
        image: &Path,
        kind: FsKind,
        access: Access,
    ) -> Result<MountGuard> {
        let mount_point = self.make_mount_point(kind)?;
        let release = self.backend.attach(
            runner,
            &MountRequest {
                image,
                kind,
                access,
                mount_point: &mount_point,
            },
        )?;
        tracing::info!(
            image = %image.display(),
            mount_point = %mount_point.display(),
            %kind,
            readonly = access.is_readonly(),
            backend = self.backend.name(),
            "mounted"
        );
        Ok(MountGuard {
            backend: Arc::clone(&self.backend),
            mount_point,
            release,
            live: true,
            fallback: (runner.executor().clone(), runner.default_deadline()),
        })
    }

    /// Mounts `image`, runs `body` against the mount point, then releases
    /// the mount whatever `body` returned.
    ///
    /// An error from `body` takes precedence over a release error, which is
    /// then only logged. If `body` succeeded, a release failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the mount error, the body's error, or the release error.
    pub fn with_mount<T, F>(
        &self,
        runner: &mut ToolRunner,
        image: &Path,
        kind: FsKind,
        access: Access,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut ToolRunner, &Path) -> Result<T>,
    {
        let guard = self.mount(runner, image, kind, access)?;
        let outcome = body(runner, guard.mount_point());
        let released = guard.release(runner);
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::error!(error = %release_err, "release failed after earlier error");
                Err(err)
            }
        }
    }
}

/// A live mount.
///
/// Released explicitly with [`MountGuard::release`]. If the guard is dropped
/// while still live, which only happens while unwinding from a panic, the
/// drop handler makes a last attempt to release it so the host is not left
/// with a stale mount.
#[derive(Debug)]
pub struct MountGuard {
    backend: Arc<dyn MountBackend>,
    mount_point: PathBuf,
    release: Release,
    live: bool,
    fallback: (Executor, Duration),
}

impl MountGuard {
    /// Directory the image is mounted on.
    #[must_use]
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Releases the mount through the backend that created it.
    ///
    /// The guard is marked released before the backend runs, so a failed
    /// release is never retried by the drop handler.
    ///
    /// # Errors
    ///
    /// Returns the backend's unmount/eject error.
    pub fn release(mut self, runner: &mut ToolRunner) -> Result<()> {
        self.live = false;
        self.backend.detach(runner, &self.mount_point, self.release)?;
        tracing::info!(mount_point = %self.mount_point.display(), "released");
        Ok(())
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        tracing::warn!(
            mount_point = %self.mount_point.display(),
            "mount still live on drop, releasing"
        );
        let (executor, deadline) = self.fallback.clone();
        let mut runner = ToolRunner::new(executor, deadline, DiagnosticBundle::default());
        if let Err(e) = self.backend.detach(&mut runner, &self.mount_point, self.release) {
            tracing::error!(
                mount_point = %self.mount_point.display(),
                error = %e,
                "fallback release failed, manual cleanup needed"
            );
        }
    }
}

//! The conversion-verification pipeline.
//!
//! One fixture moves through the stages in strict order:
//!
//! 1. **Clean**: drop diagnostics left by an earlier run.
//! 2. **`ImageReady`**: use the prebuilt image or format, mount, populate,
//!    and unmount a fresh one.
//! 3. **Converted**: copy the image and run the converter on the copy.
//! 4. **Checked**: structural check of the copy, read-only.
//! 5. **`ContentVerified`**: mount both images read-only and diff the trees.
//!
//! The first failure stops the fixture; the captured tool output is then
//! written next to the fixture and the failure is returned to the suite.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use convcheck_common::config::{HarnessConfig, ToolPaths};
use convcheck_common::constants::{
    APP_NAME, GENERATED_IMAGE_NAME, RESERVED_RECOVERY_DIR, WORKING_IMAGE_NAME,
};
use convcheck_common::error::{HarnessError, Result};
use convcheck_common::types::{Access, FsKind};
use convcheck_core::exec::{Executor, ToolInvocation};
use convcheck_core::mount::{ImageMounter, MountBackend};
use convcheck_core::runner::ToolRunner;
use convcheck_fixture::catalog::TestCase;
use convcheck_fixture::source::{FixtureSource, Recipe};
use serde::Serialize;

use crate::oracle;

const FORMATTER_TOOL: &str = "mkfs.fat";
const GENERATOR_TOOL: &str = "gen script";
const CHECKER_TOOL: &str = "fsck.ext4";
const DIFF_TOOL: &str = "rsync";

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Removing stale diagnostics.
    Clean,
    /// Obtaining the starting FAT image.
    ImageReady,
    /// Copying and converting the image.
    Converted,
    /// Running the structural checker.
    Checked,
    /// Diffing the mounted trees.
    ContentVerified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::ImageReady => write!(f, "image_ready"),
            Self::Converted => write!(f, "converted"),
            Self::Checked => write!(f, "checked"),
            Self::ContentVerified => write!(f, "content_verified"),
        }
    }
}

/// Why a fixture failed.
#[derive(Debug)]
pub struct FixtureFailure {
    /// Stage that was running when the failure occurred.
    pub stage: Stage,
    /// The failure itself.
    pub error: HarnessError,
    /// Diagnostic artifacts written for this failure.
    pub artifacts: Vec<PathBuf>,
}

/// Terminal state of one fixture: passed, or failed with a reason.
#[derive(Debug)]
pub struct FixtureOutcome {
    /// Test name.
    pub name: String,
    /// Fixture path.
    pub fixture: PathBuf,
    /// Wall-clock time for the whole pipeline.
    pub elapsed: Duration,
    /// `None` when the fixture passed.
    pub failure: Option<FixtureFailure>,
}

impl FixtureOutcome {
    /// Returns whether all three oracles agreed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Everything a fixture run needs besides the fixture itself.
#[derive(Debug, Clone)]
pub struct Pipeline {
    converter: PathBuf,
    tools: ToolPaths,
    executor: Executor,
    deadline: Duration,
    backend: Arc<dyn MountBackend>,
}

impl Pipeline {
    /// Creates a pipeline from the run configuration and mount backend.
    #[must_use]
    pub fn new(config: &HarnessConfig, backend: Arc<dyn MountBackend>) -> Self {
        Self {
            converter: config.converter.clone(),
            tools: config.tools.clone(),
            executor: Executor::new(config.tools.shell.clone()),
            deadline: config.tool_timeout(),
            backend,
        }
    }

    /// Runs one test case to PASS or FAILED.
    ///
    /// Never panics on tool failure and never leaves the fixture half-run:
    /// every mount is released and the temporary directory removed. The one
    /// exception is a failure after which a mount may still be live; the
    /// directory is then kept and its path logged.
    pub fn run(&self, case: &TestCase) -> FixtureOutcome {
        let started = Instant::now();
        let mut runner = ToolRunner::new(
            self.executor.clone(),
            self.deadline,
            case.fixture.diagnostic_bundle().with_known_tools(self.tool_names()),
        );
        let mut stage = Stage::Clean;
        tracing::info!(test = %case.name, fixture = %case.fixture.path.display(), "fixture started");

        let verdict = self.verify(case, &mut runner, &mut stage);
        let failure = verdict.err().map(|error| {
            let artifacts = match runner.bundle().flush() {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::error!(test = %case.name, error = %e, "could not write diagnostics");
                    Vec::new()
                }
            };
            tracing::warn!(test = %case.name, %stage, %error, "fixture failed");
            FixtureFailure {
                stage,
                error,
                artifacts,
            }
        });
        if failure.is_none() {
            tracing::info!(test = %case.name, "fixture passed");
        }

        FixtureOutcome {
            name: case.name.clone(),
            fixture: case.fixture.path.clone(),
            elapsed: started.elapsed(),
            failure,
        }
    }

    /// Names of every tool a fixture run may invoke, converter and mount
    /// utilities included.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [FORMATTER_TOOL, GENERATOR_TOOL, CHECKER_TOOL, DIFF_TOOL]
            .into_iter()
            .chain(self.backend.tool_names())
            .map(str::to_string)
            .collect();
        names.push(self.converter_name());
        names
    }

    fn converter_name(&self) -> String {
        self.converter
            .file_name()
            .map_or_else(|| "convert".to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn verify(&self, case: &TestCase, runner: &mut ToolRunner, stage: &mut Stage) -> Result<()> {
        *stage = Stage::Clean;
        let _ = runner.bundle().clean()?;

        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("{APP_NAME}-"))
            .tempdir()
            .map_err(|e| HarnessError::io(std::env::temp_dir(), e))?;
        let mounter = ImageMounter::new(Arc::clone(&self.backend), temp_dir.path())?;

        let result = self.verify_in(case, runner, &mounter, temp_dir.path(), stage);

        if matches!(&result, Err(e) if e.may_leave_mount_live()) {
            let kept = temp_dir.keep();
            tracing::warn!(
                path = %kept.display(),
                "temporary directory kept, stale mounts may need manual cleanup"
            );
            return result;
        }
        let temp_path = temp_dir.path().to_path_buf();
        let removed = temp_dir.close().map_err(|e| HarnessError::io(temp_path, e));
        result.and(removed)
    }

    fn verify_in(
        &self,
        case: &TestCase,
        runner: &mut ToolRunner,
        mounter: &ImageMounter,
        temp_dir: &Path,
        stage: &mut Stage,
    ) -> Result<()> {
        *stage = Stage::ImageReady;
        let source = match &case.fixture.source {
            FixtureSource::Prebuilt { image } => image.clone(),
            FixtureSource::Generated(recipe) => self.generate_image(recipe, runner, mounter, temp_dir)?,
        };
        tracing::info!(test = %case.name, image = %source.display(), "image ready");

        *stage = Stage::Converted;
        let working = temp_dir.join(WORKING_IMAGE_NAME);
        let _ = std::fs::copy(&source, &working).map_err(|e| HarnessError::io(&source, e))?;
        self.convert(runner, &working)?;
        tracing::info!(test = %case.name, "converted");

        *stage = Stage::Checked;
        self.check_structure(runner, &working)?;
        tracing::info!(test = %case.name, "structure checked");

        *stage = Stage::ContentVerified;
        self.check_content(runner, mounter, &source, &working)?;
        tracing::info!(test = %case.name, "content verified");
        Ok(())
    }

    fn generate_image(
        &self,
        recipe: &Recipe,
        runner: &mut ToolRunner,
        mounter: &ImageMounter,
        temp_dir: &Path,
    ) -> Result<PathBuf> {
        let image = temp_dir.join(GENERATED_IMAGE_NAME);
        let mkfs_args = recipe.read_mkfs_args()?;
        let mkfs_call = format!(
            "{} {} {mkfs_args}",
            shell_quote(&self.tools.mkfs_fat),
            shell_quote(&image)
        );
        let _ = runner.run(&ToolInvocation::shell(FORMATTER_TOOL, mkfs_call).with_check(oracle::check_formatter))?;

        mounter.with_mount(runner, &image, FsKind::Vfat, Access::ReadWrite, |runner, mount_point| {
            let _ = runner.run(&ToolInvocation::exec(GENERATOR_TOOL, &recipe.script, [mount_point]))?;
            Ok(())
        })?;
        Ok(image)
    }

    fn convert(&self, runner: &mut ToolRunner, working: &Path) -> Result<()> {
        let _ = runner.run(&ToolInvocation::exec(self.converter_name(), &self.converter, [working]))?;
        Ok(())
    }

    fn check_structure(&self, runner: &mut ToolRunner, working: &Path) -> Result<()> {
        let args = [OsStr::new("-n"), OsStr::new("-f"), working.as_os_str()];
        let _ = runner.run(
            &ToolInvocation::exec(CHECKER_TOOL, &self.tools.fsck_ext4, args).with_check(oracle::check_structure),
        )?;
        Ok(())
    }

    fn check_content(
        &self,
        runner: &mut ToolRunner,
        mounter: &ImageMounter,
        source: &Path,
        working: &Path,
    ) -> Result<()> {
        mounter.with_mount(runner, source, FsKind::Vfat, Access::ReadOnly, |runner, fat_mount| {
            mounter.with_mount(runner, working, FsKind::Ext4, Access::ReadOnly, |runner, ext_mount| {
                let invocation = ToolInvocation::exec(DIFF_TOOL, &self.tools.rsync, rsync_args(fat_mount, ext_mount))
                    .with_check(oracle::check_content);
                let _ = runner.run(&invocation)?;
                Ok(())
            })
        })
    }
}

/// Arguments for a checksum-based, permission-agnostic dry-run diff of
/// `source` against `target`.
///
/// The source gets a trailing slash so its contents, not the directory
/// itself, are compared.
#[must_use]
pub fn rsync_args(source: &Path, target: &Path) -> Vec<OsString> {
    let mut source_arg = source.as_os_str().to_os_string();
    if !source_arg.to_string_lossy().ends_with('/') {
        source_arg.push("/");
    }
    let mut args: Vec<OsString> = [
        "--dry-run",
        "--itemize-changes",
        "--archive",
        "--checksum",
        "--no-perms",
        "--no-owner",
        "--no-group",
        "--delete",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(format!("--exclude=/{RESERVED_RECOVERY_DIR}").into());
    args.push(source_arg);
    args.push(target.as_os_str().to_os_string());
    args
}

/// Single-quotes a path for the shell.
#[must_use]
pub fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

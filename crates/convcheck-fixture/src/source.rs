//! Fixture classification.
//!
//! A fixture either ships a ready FAT image or a recipe to build one. The
//! presence of the prebuilt image decides which.

use std::path::{Path, PathBuf};

use convcheck_common::constants::{
    FIXTURE_DIR_SUFFIX, FLAT_IMAGE_EXT, FLAT_MKFS_EXT, FLAT_SCRIPT_EXT, GENERATE_SCRIPT_NAME,
    MKFS_ARGS_NAME, PREBUILT_IMAGE_NAME,
};
use convcheck_common::error::{HarnessError, Result};
use convcheck_core::diagnostics::DiagnosticBundle;
use serde::Serialize;

/// How a fixture is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// A `*.test` directory holding `fat.img` or `mkfs.args` + `generate.sh`.
    Directory,
    /// A bare `*.img` image or `*.sh` script (with a paired `*.mkfs`).
    Flat,
}

/// Where the starting FAT image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum FixtureSource {
    /// A ready image used verbatim.
    Prebuilt {
        /// Path of the image.
        image: PathBuf,
    },
    /// An image synthesized by formatting and populating a fresh volume.
    Generated(Recipe),
}

/// Instructions for synthesizing a starting image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    /// File holding the formatter options on one line.
    pub mkfs_args: PathBuf,
    /// Script populating the mounted volume; receives the mount point.
    pub script: PathBuf,
}

impl Recipe {
    /// Reads the formatter options, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if the options file cannot be read.
    pub fn read_mkfs_args(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.mkfs_args)
            .map_err(|e| HarnessError::io(&self.mkfs_args, e))?;
        Ok(raw.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// One self-contained test unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    /// The fixture directory or file.
    pub path: PathBuf,
    /// On-disk layout.
    pub layout: Layout,
    /// Starting image source.
    pub source: FixtureSource,
}

impl Fixture {
    /// Classifies a `*.test` directory.
    #[must_use]
    pub fn from_directory(dir: &Path) -> Self {
        let image = dir.join(PREBUILT_IMAGE_NAME);
        let source = if image.exists() {
            FixtureSource::Prebuilt { image }
        } else {
            FixtureSource::Generated(Recipe {
                mkfs_args: dir.join(MKFS_ARGS_NAME),
                script: dir.join(GENERATE_SCRIPT_NAME),
            })
        };
        Self {
            path: dir.to_path_buf(),
            layout: Layout::Directory,
            source,
        }
    }

    /// Classifies a bare file, or returns `None` if it is not a fixture.
    ///
    /// A script whose stem also has an image next to it is covered by that
    /// image and yields `None`.
    #[must_use]
    pub fn from_flat_file(file: &Path) -> Option<Self> {
        let ext = file.extension()?.to_str()?;
        let source = if ext == FLAT_IMAGE_EXT {
            FixtureSource::Prebuilt {
                image: file.to_path_buf(),
            }
        } else if ext == FLAT_SCRIPT_EXT {
            if file.with_extension(FLAT_IMAGE_EXT).exists() {
                return None;
            }
            FixtureSource::Generated(Recipe {
                mkfs_args: file.with_extension(FLAT_MKFS_EXT),
                script: file.to_path_buf(),
            })
        } else {
            return None;
        };
        Some(Self {
            path: file.to_path_buf(),
            layout: Layout::Flat,
            source,
        })
    }

    /// Path stem: `basic` for both `basic.test/` and `basic.img`.
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory diagnostics are written to: the fixture directory itself,
    /// or the directory containing a flat fixture.
    #[must_use]
    pub fn diagnostics_dir(&self) -> PathBuf {
        match self.layout {
            Layout::Directory => self.path.clone(),
            Layout::Flat => self
                .path
                .parent()
                .map_or_else(PathBuf::new, Path::to_path_buf),
        }
    }

    /// An empty diagnostic bundle writing `<stem>.<tool>.{out,err}.txt`
    /// into [`Fixture::diagnostics_dir`].
    #[must_use]
    pub fn diagnostic_bundle(&self) -> DiagnosticBundle {
        DiagnosticBundle::new(self.diagnostics_dir(), format!("{}.", self.stem()))
    }
}

/// Returns whether a directory name marks a fixture directory.
#[must_use]
pub fn is_fixture_dir_name(name: &str) -> bool {
    name.len() > FIXTURE_DIR_SUFFIX.len() && name.ends_with(FIXTURE_DIR_SUFFIX)
}

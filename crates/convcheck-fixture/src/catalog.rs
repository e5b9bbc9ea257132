//! Fixture discovery and test-case registration.
//!
//! Walks a fixtures root and turns every fixture it finds into one named,
//! independent [`TestCase`].

use std::path::{Path, PathBuf};

use convcheck_common::error::{HarnessError, Result};
use serde::Serialize;
use walkdir::WalkDir;

use crate::naming;
use crate::source::{Fixture, is_fixture_dir_name};

/// A registered test: a unique name bound to one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Identifier-safe test name, unique within the catalog.
    pub name: String,
    /// Fixture the test verifies.
    pub fixture: Fixture,
}

/// All test cases found under a fixtures root, in discovery order.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    cases: Vec<TestCase>,
}

impl Catalog {
    /// Walks `root` and registers one test case per fixture.
    ///
    /// Entries are visited in file-name order, so the registration list is
    /// the same on every run. Fixture directories are not descended into.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if `root` is not a directory, or an
    /// I/O error if part of the tree cannot be read.
    pub fn discover(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(HarnessError::Config {
                message: format!("fixtures root {} is not a directory", root.display()),
            });
        }

        let fixtures = walk(root)?;
        let paths: Vec<&Path> = fixtures.iter().map(|f| f.path.as_path()).collect();
        let names = naming::assign_names(root, &paths);
        let cases: Vec<TestCase> = names
            .into_iter()
            .zip(fixtures)
            .map(|(name, fixture)| TestCase { name, fixture })
            .collect();

        tracing::info!(root = %root.display(), fixtures = cases.len(), "fixtures discovered");
        Ok(Self {
            root: root.to_path_buf(),
            cases,
        })
    }

    /// Root the catalog was discovered from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registered test cases.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Keeps only test cases whose name contains `pattern`.
    pub fn retain_matching(&mut self, pattern: &str) {
        self.cases.retain(|case| case.name.contains(pattern));
    }

    /// Number of registered test cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns whether no fixture was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Consumes the catalog, yielding its test cases.
    #[must_use]
    pub fn into_cases(self) -> Vec<TestCase> {
        self.cases
    }
}

fn walk(root: &Path) -> Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();
    let mut entries = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            HarnessError::io(path, e.into())
        })?;
        if entry.depth() == 0 {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let is_fixture = entry.file_name().to_str().is_some_and(is_fixture_dir_name);
            if is_fixture {
                tracing::debug!(path = %entry.path().display(), "fixture directory");
                fixtures.push(Fixture::from_directory(entry.path()));
                entries.skip_current_dir();
            }
        } else if file_type.is_file() {
            if let Some(fixture) = Fixture::from_flat_file(entry.path()) {
                tracing::debug!(path = %entry.path().display(), "flat fixture");
                fixtures.push(fixture);
            }
        }
    }
    Ok(fixtures)
}

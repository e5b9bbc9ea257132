//! Per-fixture diagnostic bundle.
//!
//! Captured tool output accumulates in memory for the whole fixture run and
//! is written next to the fixture only if the fixture fails. Artifacts are
//! named `<prefix><tool>.out.txt` and `<prefix><tool>.err.txt`.
//!
//! Fixtures sharing a directory can have prefixes that extend one another
//! (`a.` and `a.b.`), so stale artifacts are only recognised by their exact
//! `<prefix><tool>` name for one of the bundle's known tools.

use std::path::{Path, PathBuf};

use convcheck_common::constants::{STDERR_SUFFIX, STDOUT_SUFFIX};
use convcheck_common::error::{HarnessError, Result};

use crate::exec::ToolResult;

/// Captured output awaiting a verdict.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBundle {
    dir: PathBuf,
    prefix: String,
    known_tools: Vec<String>,
    entries: Vec<(PathBuf, Vec<u8>)>,
}

impl DiagnosticBundle {
    /// Creates an empty bundle whose artifacts land in `dir`, each file name
    /// starting with `prefix`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            known_tools: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Declares the tools whose artifacts [`DiagnosticBundle::clean`] may
    /// remove.
    #[must_use]
    pub fn with_known_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_tools = tools
            .into_iter()
            .map(|tool| artifact_stem(tool.as_ref()))
            .collect();
        self
    }

    /// Directory artifacts are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `tool` with the given suffix.
    #[must_use]
    pub fn artifact_path(&self, tool: &str, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{suffix}", self.prefix, artifact_stem(tool)))
    }

    /// Retains both streams of a tool result. Empty streams are skipped.
    ///
    /// Output from repeated invocations of the same tool is concatenated in
    /// call order.
    pub fn record(&mut self, result: &ToolResult) {
        self.push(self.artifact_path(&result.tool, STDERR_SUFFIX), &result.stderr);
        self.push(self.artifact_path(&result.tool, STDOUT_SUFFIX), &result.stdout);
    }

    fn push(&mut self, path: PathBuf, output: &[u8]) {
        if output.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => existing.extend_from_slice(output),
            None => self.entries.push((path, output.to_vec())),
        }
    }

    /// Retained (path, bytes) pairs in first-recorded order.
    #[must_use]
    pub fn entries(&self) -> &[(PathBuf, Vec<u8>)] {
        &self.entries
    }

    /// Returns whether nothing has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deletes artifacts left by earlier runs of this fixture.
    ///
    /// Only files named exactly `<prefix><tool><suffix>` for a known tool
    /// are touched. Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a stale
    /// artifact cannot be removed.
    pub fn clean(&self) -> Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| HarnessError::io(&self.dir, e))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.is_own_artifact(name) && entry.path().is_file() {
                std::fs::remove_file(entry.path()).map_err(|e| HarnessError::io(entry.path(), e))?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(dir = %self.dir.display(), removed, "removed stale diagnostics");
        }
        Ok(removed)
    }

    /// Writes every retained artifact to disk and returns their paths.
    ///
    /// # Errors
    ///
    /// Returns an error if any artifact cannot be written.
    pub fn flush(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.entries.len());
        for (path, output) in &self.entries {
            std::fs::write(path, output).map_err(|e| HarnessError::io(path, e))?;
            written.push(path.clone());
        }
        Ok(written)
    }

    fn is_own_artifact(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        rest.strip_suffix(STDOUT_SUFFIX)
            .or_else(|| rest.strip_suffix(STDERR_SUFFIX))
            .is_some_and(|tool| self.known_tools.iter().any(|known| known == tool))
    }
}

/// File-safe form of a tool name: whitespace and path separators become `-`.
#[must_use]
pub fn artifact_stem(tool: &str) -> String {
    tool.chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '-' } else { c })
        .collect()
}

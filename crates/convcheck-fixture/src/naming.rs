//! Test names derived from fixture paths.

use std::collections::HashMap;
use std::path::Path;

/// Prefix of every synthesized test name.
pub const TEST_NAME_PREFIX: &str = "test_";

/// Replaces every character that is not ASCII alphanumeric with `_`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Test name for a path stem: `many-files` becomes `test_many_files`.
#[must_use]
pub fn test_name(stem: &str) -> String {
    format!("{TEST_NAME_PREFIX}{}", normalize(stem))
}

/// Test name built from the path relative to the fixtures root, minus the
/// final extension: `ext/basic.test` becomes `test_ext_basic`.
#[must_use]
pub fn qualified_test_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let without_ext = relative.with_extension("");
    let joined = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    test_name(&joined)
}

/// Assigns unique names to fixtures given in discovery order.
///
/// Names come from the stem. Stems shared by several fixtures use the
/// root-relative path instead; any remaining clash gets a numeric suffix.
#[must_use]
pub fn assign_names(root: &Path, paths: &[&Path]) -> Vec<String> {
    let stems: Vec<String> = paths
        .iter()
        .map(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();

    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for name in stems.iter().map(|s| test_name(s)) {
        *stem_counts.entry(name).or_default() += 1;
    }

    let mut taken: HashMap<String, usize> = HashMap::new();
    paths
        .iter()
        .zip(&stems)
        .map(|(path, stem)| {
            let base = test_name(stem);
            let candidate = if stem_counts.get(&base).copied().unwrap_or(0) > 1 {
                qualified_test_name(root, path)
            } else {
                base
            };
            let seen = taken.entry(candidate.clone()).or_default();
            *seen += 1;
            if *seen == 1 {
                candidate
            } else {
                format!("{candidate}_{seen}")
            }
        })
        .collect()
}

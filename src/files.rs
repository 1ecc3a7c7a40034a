//! Resolution of the file list to sign.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Expand glob patterns into the regular files they match.
///
/// Patterns are deduplicated, symlinks are followed, and each path appears
/// once in first-seen order. Entries that cannot be read while walking are
/// skipped; a malformed pattern is an error.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen_patterns = HashSet::new();
    let mut seen_paths = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        if pattern.is_empty() || !seen_patterns.insert(pattern.as_str()) {
            continue;
        }

        let paths =
            glob::glob(pattern).with_context(|| format!("invalid file pattern '{pattern}'"))?;
        for path in paths.flatten() {
            if is_regular_file(&path) && seen_paths.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// The paths of `included` that are not in `excluded`, in order, without
/// duplicates.
pub fn set_difference(included: &[PathBuf], excluded: &[PathBuf]) -> Vec<PathBuf> {
    let excluded: HashSet<&PathBuf> = excluded.iter().collect();
    let mut seen = HashSet::new();
    included
        .iter()
        .filter(|path| !excluded.contains(path) && seen.insert(*path))
        .cloned()
        .collect()
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

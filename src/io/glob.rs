//! Glob expansion for file inputs.
//!
//! A file input may name one dump or a pattern such as `dump/shop/*.bson`. The
//! pattern is expanded once at planning time, sorted, and each match is split on
//! its own. Split-index sidecars (`.name.splits`) are never treated as inputs.

use crate::error::{Result, SplitError};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand `pattern` into a sorted list of matching files.
///
/// A pattern without metacharacters is returned as-is if the file exists, so plain
/// paths and patterns go through the same call.
///
/// # Errors
///
/// Returns [`SplitError::InvalidConfig`] if the pattern is invalid, and
/// [`SplitError::SourceUnreadable`] if a matched entry cannot be read. No matches
/// is an empty vector, not an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern)
        .map_err(|e| SplitError::invalid_config(pattern, format!("invalid glob pattern: {e}")))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| SplitError::SourceUnreadable {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if path.is_file() && !is_sidecar(&path) {
            result.push(path);
        }
    }

    result.sort();
    Ok(result)
}

/// Like [`expand_glob`], but zero matches is an error.
///
/// # Errors
///
/// Returns [`SplitError::SourceUnreadable`] with `NotFound` when nothing matches.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(SplitError::SourceUnreadable {
            path: PathBuf::from(pattern),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no files found matching pattern: {pattern}"),
            ),
        });
    }
    Ok(files)
}

fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".splits"))
}

//! Removing stale output

use super::CompilerError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Delete files under `output_dir` not in `keep`, then any directories
/// left empty. Top-level entries named in `exclude` are never touched.
/// Returns the deleted files.
pub(super) fn prune_output(
    output_dir: &Path,
    keep: &HashSet<PathBuf>,
    exclude: &[String],
) -> Result<Vec<PathBuf>, CompilerError> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }

    let excluded = |path: &Path| -> bool {
        path.strip_prefix(output_dir)
            .ok()
            .and_then(|relative| relative.components().next())
            .is_some_and(|first| exclude.iter().any(|name| first.as_os_str() == name.as_str()))
    };

    let mut pruned = Vec::new();
    let mut dirs = Vec::new();
    for entry in WalkDir::new(output_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !excluded(entry.path()))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if entry.file_type().is_dir() {
            dirs.push(path.to_path_buf());
        } else if !keep.contains(path) {
            fs::remove_file(path).map_err(|source| CompilerError::Prune {
                path: path.to_path_buf(),
                source,
            })?;
            pruned.push(path.to_path_buf());
        }
    }

    // Deepest first so parents empty out before they are checked
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    for dir in dirs {
        let empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            fs::remove_dir(&dir).map_err(|source| CompilerError::Prune { path: dir, source })?;
        }
    }

    Ok(pruned)
}

//! Module discovery and copying
//!
//! A module is a directory whose name ends in `.invowkmod`. Discovery walks
//! each search root (in argument order, file-name order within a root) and
//! never descends into a module it has found.

use crate::error::{InvowkError, InvowkResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Directory-name suffix that marks a module
pub const MODULE_SUFFIX: &str = ".invowkmod";

/// Find all module directories below `roots`.
///
/// Returned paths are absolute and unique. Two different directories with
/// the same trailing name are both returned.
pub fn discover_modules(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut modules = Vec::new();
    let mut seen = HashSet::new();
    let mut seen_roots = HashSet::new();

    for root in roots {
        let root_abs = absolute(root);
        if !seen_roots.insert(root_abs.clone()) {
            continue;
        }

        let mut walker = WalkDir::new(&root_abs).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping path during module discovery: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_dir() || !is_module_dir(entry.path()) {
                continue;
            }

            let module = entry.path().to_path_buf();
            if seen.insert(module.clone()) {
                debug!("Discovered module: {}", module.display());
                modules.push(module);
            }
            walker.skip_current_dir();
        }
    }

    modules
}

/// Module name used for hashing and as the copy destination: the final path segment.
pub fn module_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_module_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(MODULE_SUFFIX))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Copy a single file, preserving its permissions.
pub fn copy_file(src: &Path, dst: &Path) -> InvowkResult<()> {
    fs::copy(src, dst).map_err(|e| {
        InvowkError::io(
            format!("copying {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// Recursively copy a directory tree. Symlinks are skipped.
pub fn copy_dir(src: &Path, dst: &Path) -> InvowkResult<()> {
    let metadata = fs::metadata(src)
        .map_err(|e| InvowkError::io(format!("reading {}", src.display()), e))?;
    if !metadata.is_dir() {
        return Err(InvowkError::PathNotFound(src.to_path_buf()));
    }

    fs::create_dir_all(dst)
        .map_err(|e| InvowkError::io(format!("creating {}", dst.display()), e))?;

    let entries = fs::read_dir(src)
        .map_err(|e| InvowkError::io(format!("reading directory {}", src.display()), e))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| InvowkError::io(format!("reading directory {}", src.display()), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| InvowkError::io(format!("reading {}", entry.path().display()), e))?;
        let target = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            copy_file(&entry.path(), &target)?;
        }
    }

    Ok(())
}

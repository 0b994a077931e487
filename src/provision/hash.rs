//! Content hashing for cache keys
//!
//! SHA256 over file bytes, and over a directory tree as
//! (relative path, size, bytes) records in file-name order.

use crate::error::{InvowkError, InvowkResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// SHA256 of a file's contents, hex encoded.
pub fn hash_file(path: &Path) -> InvowkResult<String> {
    let mut file = File::open(path).map_err(|e| InvowkError::Hash {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| InvowkError::Hash {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(hex::encode(hasher.finalize()))
}

/// SHA256 over every regular file below `dir`, hex encoded.
///
/// A missing or unreadable root contributes no entries, so it hashes the
/// same as an existing empty directory. Entries the walk cannot read and
/// files that cannot be opened are skipped.
pub fn hash_directory(dir: &Path) -> InvowkResult<String> {
    hash_tree(dir, None)
}

/// Like [`hash_directory`], leaving out the subtree at `exclude`.
///
/// Both paths are resolved first so a relative or symlinked `exclude` still
/// matches. An `exclude` that does not exist yet has nothing to skip.
pub fn hash_directory_excluding(dir: &Path, exclude: &Path) -> InvowkResult<String> {
    match (dir.canonicalize(), exclude.canonicalize()) {
        (Ok(root), Ok(skip)) => hash_tree(&root, Some(&skip)),
        _ => hash_tree(dir, None),
    }
}

fn hash_tree(dir: &Path, exclude: Option<&Path>) -> InvowkResult<String> {
    let mut hasher = Sha256::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| exclude != Some(entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping path while hashing {}: {}", dir.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let (mut file, size) = match File::open(path).and_then(|f| {
            let len = f.metadata()?.len();
            Ok((f, len))
        }) {
            Ok(opened) => opened,
            Err(err) => {
                debug!("Skipping unreadable file {}: {}", path.display(), err);
                continue;
            }
        };

        let rel = path.strip_prefix(dir).unwrap_or(path);
        let rel = rel.to_string_lossy().replace('\\', "/");

        hasher.update(format!("{}:{}\n", rel, size).as_bytes());
        io::copy(&mut file, &mut hasher).map_err(|e| InvowkError::Hash {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_hash_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invowk");
        fs::write(&path, b"fake-binary").unwrap();

        let a = hash_file(&path).unwrap();
        let b = hash_file(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn file_hash_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"content 1").unwrap();
        fs::write(&b, b"content 2").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = hash_file(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, InvowkError::Hash { .. }));
    }

    #[test]
    fn missing_dir_hashes_like_empty_dir() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();

        let missing = hash_directory(&dir.path().join("does-not-exist")).unwrap();
        assert_eq!(missing, hash_directory(&empty).unwrap());
    }

    #[test]
    fn dir_hash_deterministic_and_content_sensitive() {
        let dir = TempDir::new().unwrap();
        let module = dir.path().join("example.invowkmod");
        fs::create_dir_all(module.join("scripts")).unwrap();
        fs::write(module.join("invowkmod.cue"), "module: \"example\"").unwrap();
        fs::write(module.join("scripts").join("run.sh"), "echo hi").unwrap();

        let first = hash_directory(&module).unwrap();
        assert_eq!(first, hash_directory(&module).unwrap());

        fs::write(module.join("scripts").join("run.sh"), "echo bye").unwrap();
        assert_ne!(first, hash_directory(&module).unwrap());
    }

    #[test]
    fn dir_hash_sensitive_to_names() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        fs::write(a.join("one.txt"), "same").unwrap();
        fs::write(b.join("two.txt"), "same").unwrap();

        assert_ne!(hash_directory(&a).unwrap(), hash_directory(&b).unwrap());
    }

    #[test]
    fn dir_hash_independent_of_location() {
        let dir = TempDir::new().unwrap();
        for root in ["x", "y"] {
            let p = dir.path().join(root);
            fs::create_dir(&p).unwrap();
            fs::write(p.join("f"), "data").unwrap();
        }
        assert_eq!(
            hash_directory(&dir.path().join("x")).unwrap(),
            hash_directory(&dir.path().join("y")).unwrap()
        );
    }

    #[test]
    fn excluded_subtree_does_not_contribute() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("invowkfile.cue"), "cmds: []").unwrap();
        let scratch = project.join("invowk-build");

        let before = hash_directory_excluding(&project, &scratch).unwrap();
        fs::create_dir_all(scratch.join("ctx-1")).unwrap();
        fs::write(scratch.join("ctx-1").join("Dockerfile"), "FROM scratch").unwrap();

        assert_eq!(before, hash_directory_excluding(&project, &scratch).unwrap());
        assert_ne!(before, hash_directory(&project).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn unopenable_file_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("invowkfile.cue"), "cmds: []").unwrap();
        let locked = root.join("locked");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // Running privileged: permissions are not enforced
            return;
        }

        let first = hash_directory(&root).unwrap();
        fs::write(root.join("invowkfile.cue"), "cmds: [1]").unwrap();
        assert_ne!(first, hash_directory(&root).unwrap());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }
}

//! Crash-safe writes for the project files under `.pipeline/`.
//!
//! Both helpers stage the contents in a temporary file beside the target,
//! flush it to disk and then move it into place, so a reader sees either the
//! previous file or the complete new one.

use crate::error::Result;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    Ok(staged)
}

/// Replace `path` with `contents`, creating missing parent directories.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    stage(path, contents)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create `path` with `contents` unless something is already there.
/// Returns `false`, leaving the existing file alone, when it was.
pub fn create_file(path: &Path, contents: &[u8]) -> Result<bool> {
    match stage(path, contents)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replace_file_overwrites_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pipeline/config.yaml");
        replace_file(&path, b"old").unwrap();
        replace_file(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn create_file_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pipeline/config.yaml");
        assert!(create_file(&path, b"first").unwrap());
        assert!(!create_file(&path, b"second").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn no_staging_files_are_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        create_file(&path, b"first").unwrap();
        create_file(&path, b"second").unwrap();
        replace_file(&path, b"third").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("config.yaml")]);
    }
}

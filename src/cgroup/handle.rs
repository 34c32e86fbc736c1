use std::path::{Path, PathBuf};

use crate::fsutil;

use super::parser;
use super::{Error, Result};

/// A resolved cgroup v2 scope directory.
///
/// Handles are resolved once per collection pass and never cached across passes, since
/// scopes appear and disappear as containers start and stop. Every read goes back to
/// the kernel; cgroup counters change continuously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupHandle {
    path: PathBuf,
}

impl CgroupHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the scope directory this handle refers to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a single-value interface file such as `memory.current`.
    ///
    /// `max` is a valid value and is returned as [`parser::UNLIMITED`].
    ///
    /// # Errors
    ///
    /// - [`Error::Read`] if the file cannot be read.
    /// - [`Error::Parse`] if the content is neither an integer nor `max`.
    pub fn read_scalar(&self, file: &str) -> Result<i64> {
        let path = self.path.join(file);
        log::trace!("Reading cgroup file `{}`", path.display());
        let content = fsutil::read_to_string(&path)?;
        parser::parse_scalar(&content).map_err(|source| Error::Parse { path, source })
    }

    /// Reads the value of `key` from a flat keyed interface file such as `memory.stat`.
    ///
    /// # Errors
    ///
    /// - [`Error::Read`] if the file cannot be read.
    /// - [`Error::FieldNotFound`] if no line carries `key`.
    /// - [`Error::Parse`] if the value of the matching line is not an integer.
    pub fn read_keyed_field(&self, file: &str, key: &str) -> Result<i64> {
        let path = self.path.join(file);
        log::trace!("Reading field `{}` of cgroup file `{}`", key, path.display());
        let content = fsutil::read_to_string(&path)?;
        match parser::parse_keyed_field(&content, key) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Error::FieldNotFound {
                path,
                field: key.to_owned(),
            }),
            Err(source) => Err(Error::Parse { path, source }),
        }
    }

    /// Reads `file`, or the field `key` within it when given.
    pub fn read_value(&self, file: &str, key: Option<&str>) -> Result<i64> {
        match key {
            Some(key) => self.read_keyed_field(file, key),
            None => self.read_scalar(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_with(files: &[(&str, &str)]) -> (tempfile::TempDir, CgroupHandle) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let handle = CgroupHandle::new(dir.path());
        (dir, handle)
    }

    #[test]
    fn test_read_scalar() {
        let (_dir, handle) = handle_with(&[("memory.current", "123\n"), ("memory.max", "max\n")]);
        assert_eq!(handle.read_scalar("memory.current").unwrap(), 123);
        assert_eq!(handle.read_scalar("memory.max").unwrap(), -1);
    }

    #[test]
    fn test_read_scalar_parse_error() {
        let (_dir, handle) = handle_with(&[("pids.max", "unlimited\n")]);
        let err = handle.read_scalar("pids.max").unwrap_err();
        match err {
            Error::Parse { path, source } => {
                assert_eq!(path, handle.path().join("pids.max"));
                assert_eq!(source.value, "unlimited");
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_scalar_missing_file() {
        let (_dir, handle) = handle_with(&[]);
        let err = handle.read_scalar("memory.peak").unwrap_err();
        match err {
            Error::Read(err) => assert!(err.is_not_found()),
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_keyed_field() {
        let (_dir, handle) = handle_with(&[("memory.stat", "anon 100\nfile 200\n")]);
        assert_eq!(handle.read_keyed_field("memory.stat", "file").unwrap(), 200);

        let err = handle.read_keyed_field("memory.stat", "missing").unwrap_err();
        match err {
            Error::FieldNotFound { field, .. } => assert_eq!(field, "missing"),
            other => panic!("expected FieldNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_keyed_field_missing_file() {
        let (_dir, handle) = handle_with(&[]);
        let err = handle.read_keyed_field("cpu.stat", "usage_usec").unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }

    #[test]
    fn test_read_value_dispatch() {
        let (_dir, handle) = handle_with(&[
            ("cpu.stat", "usage_usec 1000\nuser_usec 600\n"),
            ("pids.current", "3\n"),
        ]);
        assert_eq!(handle.read_value("cpu.stat", Some("user_usec")).unwrap(), 600);
        assert_eq!(handle.read_value("pids.current", None).unwrap(), 3);
    }

    #[test]
    fn test_reads_are_not_cached() {
        let (dir, handle) = handle_with(&[("memory.current", "1\n")]);
        assert_eq!(handle.read_scalar("memory.current").unwrap(), 1);
        std::fs::write(dir.path().join("memory.current"), "2\n").unwrap();
        assert_eq!(handle.read_scalar("memory.current").unwrap(), 2);
    }
}

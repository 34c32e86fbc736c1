use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use super::{CgroupHandle, Error, Result};

/// Directory name suffix of a systemd scope unit, one per container.
const SCOPE_SUFFIX: &[u8] = b".scope";

/// Decision returned by the visitor of [`walk_directories`] for every directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    /// Continue into the directory's children.
    Descend,
    /// Do not look below this directory.
    Prune,
}

/// Resolves a container identifier to its cgroup v2 scope directory.
///
/// Walks the tree below `root` depth-first, visiting siblings in byte order. A directory
/// matches if its name contains `id` and ends with `.scope`; matched directories are not
/// descended into, because scopes do not nest.
///
/// If more than one scope matches, a warning listing all candidates is logged and the
/// first one in traversal order is returned.
///
/// # Errors
///
/// - [`Error::NotFound`] if no directory matches. Subdirectories that disappear while
///   the walk is in progress are skipped silently, so an exiting container ends up here.
/// - [`Error::Walk`] if `root` cannot be read or a directory fails with anything other
///   than "not found".
pub fn find_scope(root: impl AsRef<Path>, id: &str) -> Result<CgroupHandle> {
    let root = root.as_ref();
    log::debug!("Searching cgroup scope for id `{}` below `{}`", id, root.display());

    let candidates = scope_candidates(root, id)?;
    let Some((found, ignored)) = split_first(candidates) else {
        log::debug!("No cgroup scope found for id `{}`", id);
        return Err(Error::NotFound {
            id: id.to_owned(),
            root: root.to_path_buf(),
        });
    };

    if !ignored.is_empty() {
        log::warn!(
            "Multiple cgroup scopes found for id `{}`, using `{}` (ignored: {:?})",
            id,
            found.display(),
            ignored
        );
    }

    log::debug!("Found cgroup scope `{}` for id `{}`", found.display(), id);
    Ok(CgroupHandle::new(found))
}

/// Collects every scope directory matching `id`, in traversal order.
fn scope_candidates(root: &Path, id: &str) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    walk_directories(root, |path, name| {
        if is_scope_for(name, id) {
            candidates.push(path.to_path_buf());
            Visit::Prune
        } else {
            Visit::Descend
        }
    })?;
    Ok(candidates)
}

/// Splits the candidates into the one to use and the ones to warn about.
fn split_first(candidates: Vec<PathBuf>) -> Option<(PathBuf, Vec<PathBuf>)> {
    let mut candidates = candidates.into_iter();
    let first = candidates.next()?;
    Some((first, candidates.collect()))
}

#[inline]
fn is_scope_for(name: &OsStr, id: &str) -> bool {
    let name = name.as_bytes();
    let id = id.as_bytes();
    !id.is_empty()
        && name.ends_with(SCOPE_SUFFIX)
        && name.windows(id.len()).any(|window| window == id)
}

/// Visits every directory below `root` in depth-first pre-order.
///
/// Uses an explicit stack instead of recursion. Children are pushed in reverse byte
/// order so that they are popped, and visited, in byte order.
fn walk_directories(
    root: &Path,
    mut visit: impl FnMut(&Path, &OsStr) -> Visit,
) -> Result<()> {
    let mut stack = subdirectories(root).map_err(|source| Error::Walk {
        path: root.to_path_buf(),
        source,
    })?;
    stack.reverse();

    while let Some(path) = stack.pop() {
        let Some(name) = path.file_name() else {
            continue;
        };
        if visit(&path, name) == Visit::Prune {
            continue;
        }

        match subdirectories(&path) {
            Ok(children) => stack.extend(children.into_iter().rev()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::trace!("cgroup `{}` vanished during walk", path.display());
            }
            Err(source) => return Err(Error::Walk { path, source }),
        }
    }

    Ok(())
}

/// Lists the immediate subdirectories of `dir`, sorted by name.
fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    dirs.sort_unstable();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdirs(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    #[test]
    fn test_is_scope_for() {
        assert!(is_scope_for(OsStr::new("cri-containerd-abcdef123.scope"), "abcdef123"));
        assert!(!is_scope_for(OsStr::new("cri-containerd-abcdef123.slice"), "abcdef123"));
        assert!(!is_scope_for(OsStr::new("cri-containerd-abc.scope"), "abcdef123"));
    }

    #[test]
    fn test_find_single_scope() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(
            root.path(),
            &[
                "kubepods.slice/kubepods-besteffort.slice/pod1/cri-containerd-abcdef123.scope",
                "kubepods.slice/kubepods-besteffort.slice/pod1/cri-containerd-999999.scope",
                "system.slice/containerd.service",
            ],
        );

        let handle = find_scope(root.path(), "abcdef123").unwrap();
        assert_eq!(
            handle.path(),
            root.path()
                .join("kubepods.slice/kubepods-besteffort.slice/pod1/cri-containerd-abcdef123.scope")
        );
    }

    #[test]
    fn test_find_scope_not_found() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), &["kubepods.slice/cri-containerd-111.scope"]);

        let err = find_scope(root.path(), "abcdef123").unwrap_err();
        match err {
            Error::NotFound { id, root: r } => {
                assert_eq!(id, "abcdef123");
                assert_eq!(r, root.path());
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_find_scope_ambiguous_takes_first_in_traversal_order() {
        let root = tempfile::tempdir().unwrap();
        // Pre-order: `a.slice` and its subtree are visited before `b-abcdef123.scope`.
        mkdirs(
            root.path(),
            &["b-abcdef123.scope", "a.slice/z-abcdef123.scope", "c-abcdef123.scope"],
        );

        let candidates = scope_candidates(root.path(), "abcdef123").unwrap();
        let (found, ignored) = split_first(candidates).unwrap();
        assert_eq!(found, root.path().join("a.slice/z-abcdef123.scope"));
        assert_eq!(
            ignored,
            vec![
                root.path().join("b-abcdef123.scope"),
                root.path().join("c-abcdef123.scope"),
            ]
        );

        let handle = find_scope(root.path(), "abcdef123").unwrap();
        assert_eq!(handle.path(), found);
    }

    #[test]
    fn test_single_candidate_ignores_nothing() {
        let only = PathBuf::from("/sys/fs/cgroup/x-abcdef123.scope");
        let (found, ignored) = split_first(vec![only.clone()]).unwrap();
        assert_eq!(found, only);
        assert!(ignored.is_empty());
        assert!(split_first(Vec::new()).is_none());
    }

    #[test]
    fn test_find_scope_prunes_matched_scope() {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), &["x-abcdef123.scope/inner-abcdef123.scope"]);

        let mut visited = Vec::new();
        walk_directories(root.path(), |path, name| {
            visited.push(path.to_path_buf());
            if is_scope_for(name, "abcdef123") {
                Visit::Prune
            } else {
                Visit::Descend
            }
        })
        .unwrap();
        assert_eq!(visited, vec![root.path().join("x-abcdef123.scope")]);

        let handle = find_scope(root.path(), "abcdef123").unwrap();
        assert_eq!(handle.path(), root.path().join("x-abcdef123.scope"));
    }

    #[test]
    fn test_find_scope_ignores_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("file-abcdef123.scope"), "").unwrap();

        assert!(matches!(
            find_scope(root.path(), "abcdef123"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_scope_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing");

        let err = find_scope(&missing, "abcdef123").unwrap_err();
        match err {
            Error::Walk { path, source } => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Walk error, got {other:?}"),
        }
    }
}

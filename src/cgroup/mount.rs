//! Detection of the cgroup v2 mount point from a `mountinfo` file.
//!
//! See [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for the line format.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil::{self, FileReadError};

/// Filesystem type of the unified cgroup hierarchy.
const CGROUP2_FS_TYPE: &str = "cgroup2";

/// Returns the mount point of the first `cgroup2` filesystem listed in `mountinfo`.
///
/// Malformed lines are skipped. Returns `Ok(None)` if no `cgroup2` mount exists, e.g.
/// on a host that still runs the legacy v1 hierarchy only.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// use container_resource_exporter::cgroup::detect_cgroup2_mount;
///
/// let root = detect_cgroup2_mount("/proc/self/mountinfo").unwrap();
/// println!("cgroup2 root: {:?}", root);
/// ```
pub fn detect_cgroup2_mount(mountinfo: impl AsRef<Path>) -> Result<Option<PathBuf>, FileReadError> {
    let path = mountinfo.as_ref();
    let mut reader = fsutil::open_file_reader(path)?;

    let mut line = String::with_capacity(256);
    loop {
        line.clear();
        let n = reader.read_line(&mut line).map_err(|source| FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            return Ok(None);
        }

        match cgroup2_mount_point(&line) {
            Some(mount_point) => {
                log::debug!("Found `cgroup2` mount point: {}", mount_point.display());
                return Ok(Some(mount_point));
            }
            None => continue,
        }
    }
}

/// Returns the unescaped mount point if `line` describes a `cgroup2` mount.
fn cgroup2_mount_point(line: &str) -> Option<PathBuf> {
    // <id> <parent> <major:minor> <root> <mount point> [optional...] - <fs type> <source> <options>
    let (pre, post) = line.split_once(" - ")?;
    if post.split_whitespace().next()? != CGROUP2_FS_TYPE {
        return None;
    }

    let mount_point = pre.split_whitespace().nth(4)?;
    Some(PathBuf::from(unescape_octal(mount_point)))
}

/// Decodes the `\ooo` escapes the kernel uses for space, tab, newline and backslash.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

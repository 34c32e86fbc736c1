//! Read-only access to the per-process files of a `/proc` tree.
//!
//! The root is configurable so the exporter can run against a host `/proc` mounted at
//! another location, and so tests can use a fake tree.

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

mod error;
mod smaps;
mod status;

pub use error::{Error, Result};
pub use smaps::{MemoryMapping, SmapsParseError, SmapsReader};

use crate::fsutil;

#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the `mountinfo` file of the exporter itself.
    pub fn mountinfo_path(&self) -> PathBuf {
        self.root.join("self").join("mountinfo")
    }

    /// Lists the ids of all processes, in ascending order.
    ///
    /// Entries that are not purely numeric (`self`, `sys`, `meminfo`, ...) are skipped.
    pub fn pids(&self) -> Result<Vec<u32>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| Error::ListProcesses {
            path: self.root.clone(),
            source,
        })?;

        let mut pids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::ListProcesses {
                path: self.root.clone(),
                source,
            })?;
            if let Some(pid) = parse_pid(&entry.file_name()) {
                pids.push(pid);
            }
        }
        pids.sort_unstable();

        Ok(pids)
    }

    /// Reads the raw cgroup membership descriptor of a process.
    pub fn read_cgroup(&self, pid: u32) -> Result<String> {
        Ok(fsutil::read_to_string(self.pid_path(pid, "cgroup"))?)
    }

    /// Reads the command name of a process, without the trailing newline.
    pub fn read_comm(&self, pid: u32) -> Result<String> {
        let comm = fsutil::read_to_string(self.pid_path(pid, "comm"))?;
        Ok(comm.trim().to_owned())
    }

    /// Reads the id of a process inside its innermost PID namespace.
    pub fn read_ns_pid(&self, pid: u32) -> Result<u32> {
        let path = self.pid_path(pid, "status");
        let content = fsutil::read_to_string(&path)?;
        let Some(value) = status::find_ns_pid(&content) else {
            return Err(Error::MissingNsPid { path });
        };

        value.parse().map_err(|source| Error::InvalidNsPid {
            value: value.to_owned(),
            path,
            source,
        })
    }

    /// Opens the memory-map report of a process as a lazy [`SmapsReader`].
    pub fn smaps(&self, pid: u32) -> Result<SmapsReader<BufReader<File>>> {
        let reader = fsutil::open_file_reader(self.pid_path(pid, "smaps"))?;
        Ok(SmapsReader::new(reader))
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        let mut path = self.root.join(pid.to_string());
        path.push(file);
        path
    }
}

fn parse_pid(name: &OsStr) -> Option<u32> {
    let name = name.to_str()?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn fake_process(root: &Path, pid: u32, files: &[(&str, &str)]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    #[test]
    fn test_pids_sorted_numeric_only() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 300, &[]);
        fake_process(tmp.path(), 12, &[]);
        fake_process(tmp.path(), 1, &[]);
        fs::create_dir(tmp.path().join("self")).unwrap();
        fs::create_dir(tmp.path().join("12abc")).unwrap();
        fs::write(tmp.path().join("meminfo"), "").unwrap();

        let procfs = ProcFs::new(tmp.path());
        assert_eq!(procfs.pids().unwrap(), vec![1, 12, 300]);
    }

    #[test]
    fn test_pids_missing_root() {
        let procfs = ProcFs::new("/definitely/does/not/exist");
        assert!(matches!(procfs.pids(), Err(Error::ListProcesses { .. })));
    }

    #[test]
    fn test_read_process_files() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(
            tmp.path(),
            4242,
            &[
                ("cgroup", "0::/kubepods.slice/cri-containerd-abc.scope\n"),
                ("comm", "nginx\n"),
                ("status", "Name:\tnginx\nNSpid:\t4242\t1\n"),
            ],
        );

        let procfs = ProcFs::new(tmp.path());
        assert_eq!(
            procfs.read_cgroup(4242).unwrap(),
            "0::/kubepods.slice/cri-containerd-abc.scope\n"
        );
        assert_eq!(procfs.read_comm(4242).unwrap(), "nginx");
        assert_eq!(procfs.read_ns_pid(4242).unwrap(), 1);
    }

    #[test]
    fn test_read_ns_pid_errors() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 1, &[("status", "Name:\tinit\n")]);
        fake_process(tmp.path(), 2, &[("status", "NSpid:\t2\tx\n")]);

        let procfs = ProcFs::new(tmp.path());
        assert!(matches!(procfs.read_ns_pid(1), Err(Error::MissingNsPid { .. })));
        assert!(matches!(procfs.read_ns_pid(2), Err(Error::InvalidNsPid { .. })));
    }

    #[test]
    fn test_vanished_process() {
        let tmp = tempfile::tempdir().unwrap();
        let procfs = ProcFs::new(tmp.path());
        match procfs.read_comm(99) {
            Err(Error::Read(err)) => assert!(err.is_not_found()),
            other => panic!("expected read error, got {other:?}"),
        }
        assert!(procfs.smaps(99).is_err());
    }

    #[test]
    fn test_smaps_reader() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(
            tmp.path(),
            7,
            &[(
                "smaps",
                "00400000-00452000 r-xp 00000000 08:02 173521 /usr/bin/app\nRss: 4 kB\n",
            )],
        );

        let procfs = ProcFs::new(tmp.path());
        let mappings: Vec<_> = procfs
            .smaps(7)
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].rss_bytes, 4096);
    }

    #[test]
    fn test_mountinfo_path() {
        let procfs = ProcFs::new("/host/proc");
        assert_eq!(procfs.mountinfo_path(), PathBuf::from("/host/proc/self/mountinfo"));
    }
}

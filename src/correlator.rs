//! Attribution of host processes to containers.
//!
//! A process belongs to a container if the container identifier appears anywhere in the
//! process's `/proc/<pid>/cgroup` descriptor. This is substring containment, not an exact
//! path comparison: an identifier that is a substring of another container's identifier
//! may capture that container's processes. Runtimes use 64 hex character ids, so this
//! only matters for truncated or synthetic ids.

use crate::config::glob_matches;
use crate::container::{Container, ProcessInfo};
use crate::procfs::ProcFs;

/// Scans the process table once and attaches every matching process to its container.
///
/// Containers are evaluated in order; the first container whose identifier is contained
/// in the descriptor and whose command pattern accepts the process wins. Processes whose
/// files cannot be read (usually because they exited mid-scan) are skipped.
pub fn correlate_processes(procfs: &ProcFs, containers: &mut [Container]) {
    if containers.is_empty() {
        return;
    }

    let pids = match procfs.pids() {
        Ok(pids) => pids,
        Err(err) => {
            log::warn!("Failed to list processes, no process metrics this pass: {}", err);
            return;
        }
    };

    let mut attached = 0usize;
    for pid in pids {
        if attribute_process(procfs, pid, containers) {
            attached += 1;
        }
    }
    log::debug!(
        "Attributed {} processes to {} containers",
        attached,
        containers.len()
    );
}

fn attribute_process(procfs: &ProcFs, pid: u32, containers: &mut [Container]) -> bool {
    let descriptor = match procfs.read_cgroup(pid) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            log::debug!("Skipping process {}: {}", pid, err);
            return false;
        }
    };

    let mut comm: Option<String> = None;
    for container in containers.iter_mut() {
        if !descriptor.contains(container.id().as_str()) {
            continue;
        }

        if comm.is_none() {
            match procfs.read_comm(pid) {
                Ok(name) => comm = Some(name),
                Err(err) => {
                    log::debug!("Skipping process {}: {}", pid, err);
                    return false;
                }
            }
        }
        let name = comm.as_deref().unwrap_or_default();
        if !glob_matches(container.command_pattern(), name) {
            continue;
        }

        let ns_pid = match procfs.read_ns_pid(pid) {
            Ok(ns_pid) => ns_pid,
            Err(err) => {
                log::debug!("Skipping process {}: {}", pid, err);
                return false;
            }
        };
        log::trace!("Process {} ({}) belongs to {}", pid, name, container);
        container.attach(ProcessInfo {
            host_pid: pid,
            ns_pid,
            comm: name.to_owned(),
        });
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerID, DiscoveredContainer};
    use std::fs;
    use std::path::Path;

    fn container(id: &str, name: &str, command: &str) -> Container {
        Container::new(
            DiscoveredContainer {
                id: ContainerID::new(id).unwrap(),
                namespace: "default".to_owned(),
                pod: "pod".to_owned(),
                container: name.to_owned(),
            },
            command,
        )
    }

    fn fake_process(root: &Path, pid: u32, cgroup: &str, comm: &str, ns_pid: u32) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cgroup"), format!("0::{cgroup}\n")).unwrap();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        fs::write(
            dir.join("status"),
            format!("Name:\t{comm}\nNSpid:\t{pid}\t{ns_pid}\n"),
        )
        .unwrap();
    }

    fn host_pids(container: &Container) -> Vec<u32> {
        container.processes().iter().map(|p| p.host_pid).collect()
    }

    #[test]
    fn test_attribution_by_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 1, "/kubepods/cri-containerd-aaa.scope", "a", 1);
        fake_process(tmp.path(), 2, "/kubepods/cri-containerd-bbb.scope", "b", 1);
        fake_process(tmp.path(), 3, "/kubepods/cri-containerd-zzz.scope", "z", 1);

        let mut containers = vec![container("aaa", "a", "*"), container("bbb", "b", "*")];
        correlate_processes(&ProcFs::new(tmp.path()), &mut containers);

        assert_eq!(host_pids(&containers[0]), vec![1]);
        assert_eq!(host_pids(&containers[1]), vec![2]);
        assert_eq!(
            containers[0].processes()[0],
            ProcessInfo {
                host_pid: 1,
                ns_pid: 1,
                comm: "a".to_owned()
            }
        );
    }

    #[test]
    fn test_command_filter_excludes_process() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 10, "/kubepods/cri-containerd-aaa.scope", "nginx", 1);
        fake_process(tmp.path(), 11, "/kubepods/cri-containerd-aaa.scope", "sh", 7);

        let mut containers = vec![container("aaa", "web", "ngin?")];
        correlate_processes(&ProcFs::new(tmp.path()), &mut containers);

        assert_eq!(host_pids(&containers[0]), vec![10]);
    }

    #[test]
    fn test_failed_glob_falls_through_to_next_container() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 5, "/kubepods/cri-containerd-aaab.scope", "worker", 2);

        let mut containers = vec![
            container("aaa", "first", "server"),
            container("aaab", "second", "*"),
        ];
        correlate_processes(&ProcFs::new(tmp.path()), &mut containers);

        assert!(containers[0].processes().is_empty());
        assert_eq!(host_pids(&containers[1]), vec![5]);
        assert_eq!(containers[1].processes()[0].ns_pid, 2);
    }

    #[test]
    fn test_overlapping_ids_attach_to_first_container() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 5, "/kubepods/cri-containerd-aaab.scope", "worker", 2);

        let mut containers = vec![container("aaa", "first", "*"), container("aaab", "second", "*")];
        correlate_processes(&ProcFs::new(tmp.path()), &mut containers);

        assert_eq!(host_pids(&containers[0]), vec![5]);
        assert!(containers[1].processes().is_empty());
    }

    #[test]
    fn test_vanished_process_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fake_process(tmp.path(), 1, "/kubepods/cri-containerd-aaa.scope", "a", 1);
        fake_process(tmp.path(), 2, "/kubepods/cri-containerd-aaa.scope", "a", 2);
        // exited between listing and reading its status
        fs::remove_file(tmp.path().join("2").join("status")).unwrap();
        // kernel thread without readable cgroup
        fs::create_dir(tmp.path().join("3")).unwrap();

        let mut containers = vec![container("aaa", "a", "*")];
        correlate_processes(&ProcFs::new(tmp.path()), &mut containers);

        assert_eq!(host_pids(&containers[0]), vec![1]);
    }

    #[test]
    fn test_missing_proc_root_attributes_nothing() {
        let mut containers = vec![container("aaa", "a", "*")];
        correlate_processes(&ProcFs::new("/definitely/does/not/exist"), &mut containers);
        assert!(containers[0].processes().is_empty());
    }
}

//! Per-cycle container and process model.
//!
//! Everything in here is rebuilt from the inventory snapshot at the start of every
//! collection pass and dropped at its end.

use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated container identifier as reported by the container runtime.
///
/// The identifier is matched as a *substring* against cgroup directory names and
/// `/proc/<pid>/cgroup` descriptors, so an empty identifier is rejected: it would match
/// every process on the node.
///
/// # Examples
///
/// ```
/// # use container_resource_exporter::container::ContainerID;
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), raw_id);
/// assert!(ContainerID::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, contains a path
    /// separator or whitespace, or exceeds [`CONTAINER_ID_MAX_LEN`] bytes.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_ID_MAX_LEN
            || src.contains('/')
            || src.contains(char::is_whitespace)
        {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running container as reported by the inventory, already passed through the
/// configured namespace/pod/container filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredContainer {
    pub id: ContainerID,
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

/// A process attributed to a container during one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process id in the host (initial) PID namespace.
    pub host_pid: u32,
    /// Process id inside the innermost PID namespace of the process.
    pub ns_pid: u32,
    /// Command name from `/proc/<pid>/comm`.
    pub comm: String,
}

/// A container together with the processes attributed to it in the current pass.
#[derive(Debug, Clone)]
pub struct Container {
    id: ContainerID,
    namespace: String,
    pod: String,
    name: String,
    command_pattern: String,
    processes: Vec<ProcessInfo>,
}

impl Container {
    /// Creates a container with an empty process list.
    ///
    /// `command_pattern` is the glob applied to the command name of every candidate
    /// process; it comes from the filter rule that admitted the container.
    pub fn new(discovered: DiscoveredContainer, command_pattern: impl Into<String>) -> Self {
        Self {
            id: discovered.id,
            namespace: discovered.namespace,
            pod: discovered.pod,
            name: discovered.container,
            command_pattern: command_pattern.into(),
            processes: Vec::new(),
        }
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    pub fn command_pattern(&self) -> &str {
        &self.command_pattern
    }

    /// Returns the processes attributed to this container in the current pass.
    pub fn processes(&self) -> &[ProcessInfo] {
        &self.processes
    }

    pub(crate) fn attach(&mut self, process: ProcessInfo) {
        self.processes.push(process);
    }

    /// Label values `[namespace, pod, container]` used for cgroup metrics.
    pub fn labels(&self) -> [&str; 3] {
        [&self.namespace, &self.pod, &self.name]
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_rejects_invalid() {
        assert!(ContainerID::new("").is_err());
        assert!(ContainerID::new("a/b").is_err());
        assert!(ContainerID::new("a b").is_err());
        assert!(ContainerID::new("x".repeat(CONTAINER_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_container_from_discovered() {
        let discovered = DiscoveredContainer {
            id: ContainerID::new("abcdef123").unwrap(),
            namespace: "default".to_owned(),
            pod: "web-0".to_owned(),
            container: "app".to_owned(),
        };
        let container = Container::new(discovered, "*");
        assert_eq!(container.labels(), ["default", "web-0", "app"]);
        assert_eq!(container.command_pattern(), "*");
        assert!(container.processes().is_empty());
        assert_eq!(container.to_string(), "default/web-0/app");
    }
}

//! YAML configuration of the exporter.
//!
//! ```yaml
//! server:
//!   address: ":8080"
//! paths:
//!   cgroup: /sys/fs/cgroup
//!   proc: /proc
//!   cri_socket: /run/containerd/containerd.sock
//! scrape_interval: 1s
//! log_level: info
//! filters:
//!   - namespace: default
//!     container: app
//! ```
//!
//! Everything except `filters` is optional. Defaults are applied and the result is
//! validated by [`Config::load`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

mod duration;
mod error;
mod filter;

pub use duration::{ParseDurationError, parse_duration};
pub use error::{Error, Result};
pub use filter::{FilterRule, Filters, MATCH_ALL, glob_matches};

use crate::cgroup;
use crate::procfs::ProcFs;

const DEFAULT_ADDRESS: &str = ":8080";
const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
const DEFAULT_PROC_ROOT: &str = "/proc";
const DEFAULT_SCRAPE_INTERVAL: &str = "1s";
const DEFAULT_LOG_LEVEL: &str = "info";

/// CRI sockets probed in order when none is configured: containerd, CRI-O, cri-dockerd.
const CRI_SOCKET_CANDIDATES: [&str; 3] = [
    "/run/containerd/containerd.sock",
    "/run/crio/crio.sock",
    "/run/cri-dockerd.sock",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerSection,
    paths: PathsSection,
    scrape_interval: Option<String>,
    log_level: Option<String>,
    filters: Filters,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    cgroup: Option<PathBuf>,
    proc: Option<PathBuf>,
    cri_socket: Option<PathBuf>,
}

/// Validated exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: SocketAddr,
    pub cgroup_root: PathBuf,
    pub proc_root: PathBuf,
    pub cri_socket: PathBuf,
    pub scrape_interval: Duration,
    pub log_level: String,
    pub filters: Filters,
}

impl Config {
    /// Reads, completes and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = crate::fsutil::read_to_string(path)?;
        let file: FileConfig = serde_yaml::from_str(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());

        Self::from_file_config(file, &CRI_SOCKET_CANDIDATES)
    }

    fn from_file_config(file: FileConfig, cri_candidates: &[&str]) -> Result<Self> {
        let address = parse_address(file.server.address.as_deref().unwrap_or(DEFAULT_ADDRESS))?;

        let scrape_interval =
            parse_duration(file.scrape_interval.as_deref().unwrap_or(DEFAULT_SCRAPE_INTERVAL))?;
        if scrape_interval.is_zero() {
            return Err(Error::ZeroInterval);
        }

        if file.filters.is_empty() {
            return Err(Error::NoFilters);
        }

        let proc_root = file
            .paths
            .proc
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
        let cgroup_root = match file.paths.cgroup {
            Some(cgroup_root) => cgroup_root,
            None => detect_cgroup_root(&proc_root),
        };
        let cri_socket = match file.paths.cri_socket {
            Some(cri_socket) => cri_socket,
            None => detect_cri_socket(cri_candidates).ok_or(Error::CriSocketNotDetected)?,
        };

        for (name, path) in [
            ("cgroup path", &cgroup_root),
            ("proc path", &proc_root),
            ("CRI socket", &cri_socket),
        ] {
            if !path.exists() {
                return Err(Error::PathNotFound {
                    name,
                    path: path.clone(),
                });
            }
        }

        Ok(Self {
            address,
            cgroup_root,
            proc_root,
            cri_socket,
            scrape_interval,
            log_level: file
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
            filters: file.filters,
        })
    }

    /// Maps `log_level` to a filter. Returns `None` for an unknown level.
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(log::LevelFilter::Off),
            "error" => Some(log::LevelFilter::Error),
            "warn" | "warning" => Some(log::LevelFilter::Warn),
            "info" => Some(log::LevelFilter::Info),
            "debug" => Some(log::LevelFilter::Debug),
            "trace" => Some(log::LevelFilter::Trace),
            _ => None,
        }
    }
}

/// Parses a listen address; a bare `:PORT` binds all interfaces.
fn parse_address(address: &str) -> Result<SocketAddr> {
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::EmptyAddress);
    }

    let normalized = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_owned(),
    };
    normalized.parse().map_err(|source| Error::InvalidAddress {
        address: address.to_owned(),
        source,
    })
}

fn detect_cgroup_root(proc_root: &Path) -> PathBuf {
    let mountinfo = ProcFs::new(proc_root).mountinfo_path();
    match cgroup::detect_cgroup2_mount(&mountinfo) {
        Ok(Some(mount_point)) => mount_point,
        Ok(None) => {
            log::warn!(
                "No cgroup2 mount found in {}, using {}",
                mountinfo.display(),
                DEFAULT_CGROUP_ROOT
            );
            PathBuf::from(DEFAULT_CGROUP_ROOT)
        }
        Err(err) => {
            log::debug!("Failed to detect cgroup2 mount, using {}: {}", DEFAULT_CGROUP_ROOT, err);
            PathBuf::from(DEFAULT_CGROUP_ROOT)
        }
    }
}

fn detect_cri_socket(candidates: &[&str]) -> Option<PathBuf> {
    let found = candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists());
    match &found {
        Some(path) => log::info!("Detected CRI socket at {}", path.display()),
        None => log::warn!("Failed to auto-detect CRI socket from common locations"),
    }
    found
}

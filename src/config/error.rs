use std::path::PathBuf;

use super::duration::ParseDurationError;
use crate::fsutil::FileReadError;

/// Errors that make a configuration unusable. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] FileReadError),
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("server.address is required")]
    EmptyAddress,
    #[error("invalid server.address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("invalid scrape_interval: {0}")]
    InvalidInterval(#[from] ParseDurationError),
    #[error("scrape_interval must be greater than zero")]
    ZeroInterval,
    #[error("at least one container filter is required")]
    NoFilters,
    #[error("paths.cri_socket was not auto-detected and is required to be specified")]
    CriSocketNotDetected,
    #[error("{name} does not exist: {path}")]
    PathNotFound { name: &'static str, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;

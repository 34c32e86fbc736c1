use std::num::ParseIntError;
use std::path::PathBuf;

use crate::fsutil::FileReadError;

/// Errors that may occur while reading per-process metadata.
///
/// Most of these are expected under process churn: a process listed at the start of the
/// scan may be gone by the time its files are read.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] FileReadError),
    #[error("failed to list processes in `{path}`: {source}")]
    ListProcesses {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing `NSpid` line in `{path}`")]
    MissingNsPid { path: PathBuf },
    #[error("invalid `NSpid` value `{value}` in `{path}`: {source}")]
    InvalidNsPid {
        path: PathBuf,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

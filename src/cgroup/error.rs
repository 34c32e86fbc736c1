//! Error types for locating cgroup scopes and reading their interface files.
//!
//! Every variant is item-soft from the point of view of a collection pass: the caller
//! logs it and skips the affected container or metric.

use std::path::PathBuf;

use crate::fsutil::FileReadError;

use super::parser::InvalidValueError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No scope directory containing the identifier exists below the root. This
    /// includes the benign race where the container exited during the walk.
    #[error("no cgroup scope for id `{id}` below `{root}`")]
    NotFound { id: String, root: PathBuf },

    #[error("failed to walk cgroup directory `{path}`: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Read(#[from] FileReadError),

    #[error("failed to parse cgroup file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: InvalidValueError,
    },

    #[error("field `{field}` not found in cgroup file `{path}`")]
    FieldNotFound { path: PathBuf, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;

//! Parsers for the two shapes of numeric cgroup v2 interface files.
//!
//! - Single-value files such as `memory.current`, `memory.max` or `pids.max`, which hold
//!   one integer or the literal `max`.
//! - Flat keyed files such as `memory.stat` or `cpu.stat`, which hold one
//!   `<key> <value>` record per line.
//!
//! See <https://docs.kernel.org/admin-guide/cgroup-v2.html#interface-files>.

use std::num::ParseIntError;

/// Value reported for a limit file containing `max`, i.e. "no limit".
pub const UNLIMITED: i64 = -1;

/// A value in a cgroup interface file could not be parsed as an integer.
#[derive(Debug, thiserror::Error)]
#[error("invalid value at line {line}: '{value}': {source}")]
pub struct InvalidValueError {
    pub value: String,
    pub line: usize,
    #[source]
    pub source: ParseIntError,
}

/// Parses a single-value interface file.
///
/// Surrounding whitespace is ignored. The token `max` yields [`UNLIMITED`].
///
/// # Errors
///
/// Returns [`InvalidValueError`] if the content is neither an integer nor `max`
/// (including empty content).
pub fn parse_scalar(content: &str) -> Result<i64, InvalidValueError> {
    let value = content.trim();
    if value == "max" {
        return Ok(UNLIMITED);
    }

    value
        .parse::<i64>()
        .map_err(|source| InvalidValueError {
            value: value.to_owned(),
            line: 1,
            source,
        })
}

/// Looks up `key` in a flat keyed interface file.
///
/// Only lines consisting of exactly two whitespace-separated fields are considered, and
/// the first line whose key equals `key` wins. Returns `Ok(None)` if no line matches.
///
/// # Errors
///
/// Returns [`InvalidValueError`] if the matching line's value is not an integer.
pub fn parse_keyed_field(content: &str, key: &str) -> Result<Option<i64>, InvalidValueError> {
    for (idx, line) in content.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let (Some(k), Some(v), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if k != key {
            continue;
        }

        return v
            .parse::<i64>()
            .map(Some)
            .map_err(|source| InvalidValueError {
                value: v.to_owned(),
                line: idx + 1,
                source,
            });
    }

    Ok(None)
}

//! Parser for Go-style duration strings such as `1s`, `500ms` or `1m30s`.
//!
//! Supported units: `ns`, `us` (`µs`, `μs`), `ms`, `s`, `m`, `h`. Each component may
//! carry a decimal fraction (`1.5s`). The bare string `0` is accepted. Negative
//! durations are not.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration `{input}`: {message}")]
pub struct ParseDurationError {
    pub input: String,
    pub message: &'static str,
}

/// Parses a Go-style duration.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use container_resource_exporter::config::parse_duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("10").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let err = |message| ParseDurationError {
        input: input.to_owned(),
        message,
    };

    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(err("empty duration"));
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        if number.is_empty() || number == "." {
            return Err(err("expected a number"));
        }

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let scale = match unit {
            "" => return Err(err("missing unit")),
            other => unit_nanos(other).ok_or_else(|| err("unknown unit"))?,
        };

        total = total
            .checked_add(component_nanos(number, scale).ok_or_else(|| err("invalid number"))?)
            .ok_or_else(|| err("duration overflow"))?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| err("duration overflow"))?;
    Ok(Duration::from_nanos(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Converts `<int>[.<frac>]` in the given unit to nanoseconds.
fn component_nanos(number: &str, scale: u128) -> Option<u128> {
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if frac_part.contains('.') {
        return None;
    }

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut nanos = int.checked_mul(scale)?;

    // digits beyond nanosecond precision of an hour are irrelevant
    let frac_digits = &frac_part[..frac_part.len().min(18)];
    if !frac_digits.is_empty() {
        let frac: u128 = frac_digits.parse().ok()?;
        let divisor = 10u128.pow(u32::try_from(frac_digits.len()).ok()?);
        nanos = nanos.checked_add(frac * scale / divisor)?;
    }

    Some(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h2m3s").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse_duration("").unwrap_err().message, "empty duration");
        assert_eq!(parse_duration("10").unwrap_err().message, "missing unit");
        assert_eq!(parse_duration("10d").unwrap_err().message, "unknown unit");
        assert_eq!(parse_duration("s").unwrap_err().message, "expected a number");
        assert_eq!(parse_duration("-1s").unwrap_err().message, "expected a number");
        assert_eq!(parse_duration("1.2.3s").unwrap_err().message, "invalid number");
    }
}

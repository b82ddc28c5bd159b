//! Parser for ioping batch output (`ioping -B`).
//!
//! A batch run prints a single line of ten whitespace-separated decimal
//! fields. Only the fields the exporter consumes are read; the remaining
//! ones keep their default value.

use std::str::FromStr;

use thiserror::Error;

use super::target::ProbeMode;

/// Error type for batch line parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The line ended before the requested field index.
    #[error("missing field {field} at index {index}: line has {found} fields, expected at least 9")]
    MissingField {
        field: &'static str,
        index: usize,
        found: usize,
    },
    /// The field exists but is not a valid number of the expected type.
    #[error("invalid {field} at index {index}: '{value}' ({reason})")]
    InvalidField {
        field: &'static str,
        index: usize,
        value: String,
        reason: String,
    },
}

/// One parsed ioping measurement.
///
/// Field order follows ioping's `dump_statistics`; indices are noted on
/// each field. Fields without a note on parsing stay at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub target: String,
    pub mode: ProbeMode,
    /// (0) count of requests in statistics. Parsed.
    pub valid: u64,
    /// (1) running time, nsec.
    pub sum_ns: f64,
    /// (2) requests per second. Parsed.
    pub iops: f64,
    /// (3) transfer speed, bytes/sec. Parsed.
    pub speed: f64,
    /// (4) minimal request time, nsec.
    pub min_ns: u64,
    /// (5) average request time, nsec.
    pub avg_ns: f64,
    /// (6) maximum request time, nsec. Parsed.
    pub max_ns: u64,
    /// (7) request time standard deviation, nsec.
    pub mdev_ns: f64,
    /// (8) total requests, including too slow and too fast. Parsed.
    pub count: u64,
    /// (9) total running time, nsec.
    pub load_time_ns: u64,
}

/// Parses one ioping batch line into [`Statistics`].
///
/// Fields are positional: `valid _ iops speed _ _ max _ count _`.
pub fn parse_statistics(
    target: &str,
    mode: ProbeMode,
    raw: &str,
) -> Result<Statistics, ParseError> {
    let fields: Vec<&str> = raw.split_whitespace().collect();

    Ok(Statistics {
        target: target.to_string(),
        mode,
        valid: parse_field(&fields, 0, "valid_requests")?,
        iops: parse_field(&fields, 2, "iops")?,
        speed: parse_field(&fields, 3, "bytes_per_sec")?,
        max_ns: parse_field(&fields, 6, "max_request_ns")?,
        count: parse_field(&fields, 8, "total_requests")?,
        ..Statistics::default()
    })
}

/// Reads the field at `index` and parses it as `T`.
fn parse_field<T>(fields: &[&str], index: usize, name: &'static str) -> Result<T, ParseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = fields.get(index).ok_or(ParseError::MissingField {
        field: name,
        index,
        found: fields.len(),
    })?;

    value.parse().map_err(|e: T::Err| ParseError::InvalidField {
        field: name,
        index,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

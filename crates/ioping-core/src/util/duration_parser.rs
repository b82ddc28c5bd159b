//! Duration parser for CLI arguments.
//!
//! Accepts the same shapes as the exporter's historical flags:
//! - Unit suffixed: `500ms`, `1s`, `2m`, `1h`, `250us`, `100ns`
//! - Fractional: `1.5s`, `0.25h`
//! - Compound: `1m30s`, `1h15m`
//! - Bare integer seconds: `10`

use std::time::Duration;

/// Error type for duration parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse duration '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for DurationParseError {}

/// Parses a duration string such as `1s`, `500ms` or `1m30s`.
///
/// # Examples
///
/// ```
/// use ioping_core::util::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    let fail = |message: &str| DurationParseError {
        input: input.to_string(),
        message: message.to_string(),
    };

    if input.is_empty() {
        return Err(fail("empty duration"));
    }

    if let Some(secs) = try_parse_bare_seconds(input) {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_ns: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(fail("expected a number"));
        }
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_ns = unit_nanos(&rest[..unit_len])
            .ok_or_else(|| fail("unknown unit, use ns, us, ms, s, m, h or d"))?;
        rest = &rest[unit_len..];

        let part_ns = if number.contains('.') {
            let value: f64 = number.parse().map_err(|_| fail("invalid number"))?;
            let ns = (value * unit_ns as f64).round();
            // `as` saturates, so range-check before casting.
            if !ns.is_finite() || ns >= u128::MAX as f64 {
                return Err(fail("duration out of range"));
            }
            ns as u128
        } else {
            let value: u128 = number.parse().map_err(|_| fail("invalid number"))?;
            value
                .checked_mul(u128::from(unit_ns))
                .ok_or_else(|| fail("duration out of range"))?
        };
        total_ns = total_ns
            .checked_add(part_ns)
            .ok_or_else(|| fail("duration out of range"))?;
    }

    u64::try_from(total_ns)
        .map(Duration::from_nanos)
        .map_err(|_| fail("duration out of range"))
}

/// Plain integer, interpreted as seconds.
fn try_parse_bare_seconds(input: &str) -> Option<u64> {
    if input.chars().all(|c| c.is_ascii_digit()) {
        input.parse().ok()
    } else {
        None
    }
}

/// Nanoseconds per unit suffix.
fn unit_nanos(unit: &str) -> Option<u64> {
    const SEC: u64 = 1_000_000_000;
    match unit {
        "ns" => Some(1),
        "us" | "µs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(SEC),
        "m" => Some(60 * SEC),
        "h" => Some(3600 * SEC),
        "d" => Some(86400 * SEC),
        _ => None,
    }
}

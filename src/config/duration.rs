/// Human-readable durations such as `500ms`, `30s`, `1m30s` or `2h`.
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a duration string.
///
/// Accepts one or more `<number><unit>` groups where unit is `ms`, `s`, `m`
/// or `h`. Fractions are allowed (`1.5s`). Negative values and bare numbers
/// are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let value = input.trim();
    if value.is_empty() {
        return Err(invalid("empty duration"));
    }
    if value.starts_with('-') {
        return Err(invalid("durations cannot be negative"));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit (ms, s, m or h)"))?;
        if number_end == 0 {
            return Err(invalid("expected a number"));
        }
        let number = &rest[..number_end];

        let unit_end = rest[number_end..]
            .find(|c: char| c.is_ascii_digit())
            .map(|i| number_end + i)
            .unwrap_or(rest.len());
        let unit_nanos: u64 = match &rest[number_end..unit_end] {
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => return Err(invalid(&format!("unknown unit '{}'", other))),
        };

        let part = if number.contains('.') {
            let value: f64 = number.parse().map_err(|_| invalid("expected a number"))?;
            Duration::from_nanos((value * unit_nanos as f64).round() as u64)
        } else {
            let value: u64 = number.parse().map_err(|_| invalid("expected a number"))?;
            let nanos = value
                .checked_mul(unit_nanos)
                .ok_or_else(|| invalid("duration too large"))?;
            Duration::from_nanos(nanos)
        };

        total = total
            .checked_add(part)
            .ok_or_else(|| invalid("duration too large"))?;
        rest = &rest[unit_end..];
    }

    Ok(total)
}

/// Format a duration compactly, e.g. `1m30s`, `45s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let millis = d.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}s{}ms", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        let mut out = String::new();
        if hours > 0 {
            out.push_str(&format!("{}h", hours));
        }
        if mins > 0 {
            out.push_str(&format!("{}m", mins));
        }
        if secs > 0 {
            out.push_str(&format!("{}s", secs));
        }
        out
    }
}

/// Serde adapter for `Duration` fields written as strings.
pub mod serde_str {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

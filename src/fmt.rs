//! Provides parsing and formatting helpers for byte sizes and durations.
//!
//! These are used to read human friendly values like "100m" or "60s" from the configuration and to
//! render budgets and intervals in log messages and reports.
use std::fmt::Write;
use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

const DURATION_UNITS: [(u128, &str); 5] = [
    (24 * 60 * 60 * 1000, "d"),
    (60 * 60 * 1000, "h"),
    (60 * 1000, "m"),
    (1000, "s"),
    (1, "ms"),
];

/// Formats the given number of bytes using the largest fitting binary unit.
///
/// Exact multiples of a unit are rendered without decimals, everything else is rounded to a
/// single decimal place.
///
/// # Examples
///
/// ```
/// # use surface_cache::fmt::format_size;
/// assert_eq!(format_size(0), "0 bytes");
/// assert_eq!(format_size(1), "1 byte");
/// assert_eq!(format_size(1_023), "1023 bytes");
/// assert_eq!(format_size(1_024), "1 KiB");
/// assert_eq!(format_size(8_734), "8.5 KiB");
/// assert_eq!(format_size(1_000_000), "976.6 KiB");
/// assert_eq!(format_size(100 * 1024 * 1024), "100 MiB");
/// assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
/// ```
pub fn format_size(bytes: usize) -> String {
    match bytes {
        1 => return "1 byte".to_owned(),
        0..=1023 => return format!("{} bytes", bytes),
        _ => (),
    }

    let mut value = bytes as f64 / 1024.;
    let mut unit = 0;
    while value >= 1024. && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.;
        unit += 1;
    }

    if value.fract() == 0. {
        format!("{} {}", value as u64, SIZE_UNITS[unit])
    } else {
        format!("{:.1} {}", value, SIZE_UNITS[unit])
    }
}

/// Formats a duration like "1h 2m 5s".
///
/// Units which are zero are skipped, a zero duration is rendered as "0ms".
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use surface_cache::fmt::format_duration;
/// assert_eq!(format_duration(Duration::ZERO), "0ms");
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// assert_eq!(format_duration(Duration::from_secs(30)), "30s");
/// assert_eq!(format_duration(Duration::from_millis(90_500)), "1m 30s 500ms");
/// assert_eq!(format_duration(Duration::from_secs(25 * 60 * 60)), "1d 1h");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_millis();
    if remaining == 0 {
        return "0ms".to_owned();
    }

    let mut result = String::new();
    for (millis, suffix) in DURATION_UNITS {
        let amount = remaining / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            remaining %= millis;
        }
    }

    result
}

/// Parses a byte size like "100m".
///
/// The number can be followed by one of these (case insensitive) suffixes:
/// * **b**: bytes (which is also the default)
/// * **k**: KiB
/// * **m**: MiB
/// * **g**: GiB
/// * **t**: TiB
///
/// # Errors
/// Fails for negative or decimal numbers, unknown suffixes or values which overflow.
///
/// # Examples
///
/// ```
/// # use surface_cache::fmt::parse_size;
/// assert_eq!(parse_size("512").unwrap(), 512);
/// assert_eq!(parse_size("512b").unwrap(), 512);
/// assert_eq!(parse_size("4 k").unwrap(), 4096);
/// assert_eq!(parse_size("100m").unwrap(), 100 * 1024 * 1024);
/// assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
///
/// assert_eq!(parse_size("1.5m").is_err(), true);
/// assert_eq!(parse_size("-1").is_err(), true);
/// assert_eq!(parse_size("12 parsecs").is_err(), true);
/// ```
pub fn parse_size(value: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE: regex::Regex = regex::Regex::new(r"^\s*(\d+)\s*([bkmgtBKMGT]?)\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = SIZE.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as size. Expected a positive number and an optional unit (b, k, m, g, t).",
            value
        )
    })?;

    let multiplier: u64 = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        "t" => 1 << 40,
        _ => 1,
    };

    captures[1]
        .parse::<u64>()
        .ok()
        .and_then(|number| number.checked_mul(multiplier))
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is out of range.", value))
}

/// Parses a duration like "60s".
///
/// The number can be followed by one of these (case insensitive) suffixes:
/// * **ms**: milliseconds (which is also the default)
/// * **s**: seconds
/// * **m**: minutes
/// * **h**: hours
/// * **d**: days
///
/// # Errors
/// Fails for negative or decimal numbers, unknown suffixes or values which overflow.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use surface_cache::fmt::parse_duration;
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("250 ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("2 M").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
/// assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
///
/// assert_eq!(parse_duration("1.5s").is_err(), true);
/// assert_eq!(parse_duration("-1s").is_err(), true);
/// assert_eq!(parse_duration("3 weeks").is_err(), true);
/// ```
pub fn parse_duration(value: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*((?i:ms|s|m|h|d))?\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = DURATION.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as duration. Expected a positive number and an optional unit (ms, s, m, h, d).",
            value
        )
    })?;

    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let millis_per_unit = match unit.as_str() {
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        _ => 1,
    };

    captures[1]
        .parse::<u64>()
        .ok()
        .and_then(|number| number.checked_mul(millis_per_unit))
        .map(Duration::from_millis)
        .ok_or_else(|| anyhow::anyhow!("The duration '{}' is out of range.", value))
}

#[cfg(test)]
mod tests {
    use crate::fmt::{format_duration, format_size, parse_duration, parse_size};
    use std::time::Duration;

    #[test]
    fn overflowing_values_are_rejected() {
        assert!(parse_size("99999999999999999999999").is_err());
        assert!(parse_size(format!("{}t", usize::MAX)).is_err());
        assert!(parse_duration("99999999999999999999999").is_err());
        assert!(parse_duration(format!("{}d", u64::MAX)).is_err());
    }

    #[test]
    fn parsed_values_can_be_formatted() {
        assert_eq!(format_size(parse_size("100m").unwrap()), "100 MiB");
        assert_eq!(format_size(parse_size("1t").unwrap()), "1 TiB");
        assert_eq!(format_duration(parse_duration("90s").unwrap()), "1m 30s");
        assert_eq!(format_duration(parse_duration("1d").unwrap()), "1d");
        assert_eq!(format_duration(Duration::from_millis(1)), "1ms");
    }
}

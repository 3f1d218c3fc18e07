// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Parses `syncInterval` values such as `"30s"`, `"5m"`, `"1h"` or `"1h30m"` into
//! a Rust `std::time::Duration`, and clamps them to the allowed resync window.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::warn;

use crate::constants::{DEFAULT_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units are `s`, `m` and `h`, and components may be chained
/// (`"1h30m"`). Every component needs a unit.
///
/// # Examples
///
/// ```
/// use tunnelsync::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
///
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("10x").is_err()); // Invalid unit
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, a component is missing its unit,
/// a value is not a positive integer, the unit is unknown, or the total overflows.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let input = duration_str.trim();
    if input.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total: u64 = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let split_pos = rest
            .find(|c: char| !c.is_ascii_digit())
            .context("Duration must end with a unit (s, m, or h)")?;
        if split_pos == 0 {
            bail!("Duration component in '{input}' is missing its numeric value");
        }

        let (value_str, tail) = rest.split_at(split_pos);
        let value: u64 = value_str
            .parse()
            .context("Duration value must be a positive integer")?;

        // Byte offset, so multibyte units split on a char boundary
        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, remainder) = tail.split_at(unit_len);

        let multiplier = match unit {
            "s" => 1,
            "m" => SECONDS_PER_MINUTE,
            "h" => SECONDS_PER_HOUR,
            _ => bail!(
                "Unsupported duration unit '{unit}'. Use 's' (seconds), 'm' (minutes), or 'h' (hours)"
            ),
        };

        let seconds = value
            .checked_mul(multiplier)
            .context("Duration value too large (overflow)")?;
        total = total
            .checked_add(seconds)
            .context("Duration value too large (overflow)")?;
        rest = remainder;
    }

    Ok(Duration::from_secs(total))
}

/// Resolve an optional `syncInterval` into the effective resync period.
///
/// Missing values use the 5 minute default, unparseable values log a warning
/// and use the default, and parsed values are clamped to `[1m, 1h]`.
#[must_use]
pub fn effective_sync_interval(sync_interval: Option<&str>) -> Duration {
    let default = Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS);
    let Some(raw) = sync_interval.filter(|s| !s.trim().is_empty()) else {
        return default;
    };

    match parse_duration(raw) {
        Ok(parsed) => parsed.clamp(
            Duration::from_secs(MIN_SYNC_INTERVAL_SECS),
            Duration::from_secs(MAX_SYNC_INTERVAL_SECS),
        ),
        Err(e) => {
            warn!(sync_interval = raw, error = %e, "Invalid syncInterval, using default");
            default
        }
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;

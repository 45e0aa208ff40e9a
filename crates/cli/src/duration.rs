// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses duration flags/config values into `Duration`, surfacing
//! `ConfigError::InvalidDuration` (§7) on anything malformed.

use std::time::Duration;

use simtail_core::ConfigError;

/// Accepts a bare number of seconds (`"30"`, `"1.5"`) or a number with a
/// `ms`/`s`/`m`/`h` suffix (`"500ms"`, `"2m"`).
pub fn parse_duration_arg(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    let invalid = || ConfigError::InvalidDuration {
        value: value.to_string(),
    };

    let split_at = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);
    let number: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        "" | "s" => 1.0,
        "ms" => 0.001,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(invalid()),
    };
    if !number.is_finite() || number < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs_f64(number * multiplier))
}

/// Validates a plain seconds value loaded from a config file.
pub fn duration_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidDuration {
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration_arg("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_suffixed_units() {
        assert_eq!(
            parse_duration_arg("500ms").unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(parse_duration_arg("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration_arg("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_negative_and_unknown_units() {
        assert!(parse_duration_arg("-5s").is_err());
        assert!(parse_duration_arg("5x").is_err());
        assert!(parse_duration_arg("nope").is_err());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `LogEntry`: one observation parsed from the producer's NDJSON stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity, totally ordered by priority `Debug < Info < Default < Error < Fault`.
///
/// Declaration order doubles as priority order: `derive(PartialOrd, Ord)`
/// compares enum discriminants in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Default,
    Error,
    Fault,
}

impl Level {
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn all() -> [Level; 5] {
        [
            Level::Debug,
            Level::Info,
            Level::Default,
            Level::Error,
            Level::Fault,
        ]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Default => "default",
            Level::Error => "error",
            Level::Fault => "fault",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Case-insensitive per the where-expression field table (§4.4).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "default" => Ok(Level::Default),
            "error" => Ok(Level::Error),
            "fault" => Ok(Level::Fault),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// A timestamp that preserves the originally observed UTC offset, with
/// nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Nanoseconds since the Unix epoch, UTC.
    pub epoch_nanos: i64,
    /// Offset from UTC in seconds, as observed in the source string.
    pub utc_offset_secs: i32,
}

impl Timestamp {
    pub fn from_epoch_nanos(epoch_nanos: i64) -> Self {
        Self {
            epoch_nanos,
            utc_offset_secs: 0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot parse timestamp '{0}'")]
pub struct ParseTimestampError(pub String);

impl FromStr for Timestamp {
    type Err = ParseTimestampError;

    /// Parses `YYYY-MM-DD HH:MM:SS[.frac]±ZZZZ` with fractional digits 1-9,
    /// per §4.2. This is the only recognized format; anything else is an error
    /// and the caller (the Parser component) is responsible for the
    /// now()-substitution fallback and hook invocation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timestamp(s).ok_or_else(|| ParseTimestampError(s.to_string()))
    }
}

fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let bytes = s.as_bytes();
    if bytes.len() < 24 {
        return None;
    }
    let year: i64 = s.get(0..4)?.parse().ok()?;
    if s.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    let month: u32 = s.get(5..7)?.parse().ok()?;
    if s.as_bytes().get(7) != Some(&b'-') {
        return None;
    }
    let day: u32 = s.get(8..10)?.parse().ok()?;
    if s.as_bytes().get(10) != Some(&b' ') {
        return None;
    }
    let hour: u32 = s.get(11..13)?.parse().ok()?;
    if s.as_bytes().get(13) != Some(&b':') {
        return None;
    }
    let minute: u32 = s.get(14..16)?.parse().ok()?;
    if s.as_bytes().get(16) != Some(&b':') {
        return None;
    }
    let second: u32 = s.get(17..19)?.parse().ok()?;

    let mut rest = s.get(19..)?;
    let mut nanos: i64 = 0;
    if let Some(stripped) = rest.strip_prefix('.') {
        let frac_len = stripped
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count()
            .min(9);
        if frac_len == 0 {
            return None;
        }
        let frac_str = &stripped[..frac_len];
        let frac_val: i64 = frac_str.parse().ok()?;
        nanos = frac_val * 10i64.pow((9 - frac_len) as u32);
        rest = &stripped[frac_len..];
    }

    let sign = match rest.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let offset_digits = &rest.get(1..5)?;
    if !offset_digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let offset_hh: i32 = offset_digits[0..2].parse().ok()?;
    let offset_mm: i32 = offset_digits[2..4].parse().ok()?;
    let utc_offset_secs = sign * (offset_hh * 3600 + offset_mm * 60);

    let days = days_from_civil(year, month, day)?;
    let epoch_secs = days * 86_400 + i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second)
        - i64::from(utc_offset_secs);
    let epoch_nanos = epoch_secs * 1_000_000_000 + nanos;

    Some(Timestamp {
        epoch_nanos,
        utc_offset_secs,
    })
}

/// Howard Hinnant's civil-from-days algorithm, the usual dependency-free way
/// to turn a Y-M-D triple into a day count relative to the Unix epoch.
fn days_from_civil(y: i64, m: u32, d: u32) -> Option<i64> {
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some(era * 146_097 + doe - 719_468)
}

/// One observation from the producer's unified-logging NDJSON stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub level: Level,
    pub process: String,
    pub pid: i32,
    pub tid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_image_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Assigned by the session tracker; 0 until a session has been opened.
    #[serde(default)]
    pub session: u64,
    /// Assigned by the pipeline at emission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail_id: Option<crate::id::TailId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_first: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_last: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_priority_order_matches_spec() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Default);
        assert!(Level::Default < Level::Error);
        assert!(Level::Error < Level::Fault);
    }

    #[test]
    fn level_from_str_is_case_insensitive() {
        assert_eq!("ERROR".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("Fault".parse::<Level>().unwrap(), Level::Fault);
    }

    #[test]
    fn level_from_str_rejects_unknown() {
        assert!("trace".parse::<Level>().is_err());
    }

    #[test]
    fn timestamp_parses_with_fractional_seconds_and_offset() {
        let ts: Timestamp = "2026-07-28 10:15:30.123456789-0700".parse().unwrap();
        assert_eq!(ts.utc_offset_secs, -7 * 3600);
        assert_eq!(ts.epoch_nanos % 1_000_000_000, 123_456_789);
    }

    #[test]
    fn timestamp_parses_without_fractional_seconds() {
        let ts: Timestamp = "2026-01-01 00:00:00+0000".parse().unwrap();
        assert_eq!(ts.epoch_nanos, 1_767_225_600_000_000_000);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!("not a timestamp".parse::<Timestamp>().is_err());
    }

    #[test]
    fn timestamp_ordering_accounts_for_offset_via_epoch_nanos() {
        let a: Timestamp = "2026-01-01 00:00:00+0000".parse().unwrap();
        let b: Timestamp = "2026-01-01 01:00:00+0100".parse().unwrap();
        assert_eq!(a.epoch_nanos, b.epoch_nanos);
    }
}

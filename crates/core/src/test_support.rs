// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::clock::FakeClock;
use crate::entry::{Level, LogEntry, Timestamp};
use crate::id::TailId;
use crate::session::Session;

/// A minimal, otherwise-default `LogEntry` with the three fields tests care
/// about set explicitly.
pub fn log_entry(level: Level, message: &str, pid: i32) -> LogEntry {
    LogEntry {
        timestamp: Timestamp::from_epoch_nanos(0),
        level,
        process: "App".to_string(),
        pid,
        tid: 1,
        subsystem: Some("com.example.app".to_string()),
        category: None,
        message: message.to_string(),
        process_path: None,
        process_image_uuid: None,
        sender_path: None,
        event_type: Some("logEvent".to_string()),
        session: 1,
        tail_id: None,
        dedupe_count: None,
        dedupe_first: None,
        dedupe_last: None,
    }
}

/// `log_entry` at a given epoch-seconds instant, for dedupe/ticker tests
/// that need explicit timing (e.g. S3's t=0s/3s/10s).
pub fn log_entry_at(level: Level, message: &str, pid: i32, epoch_secs: i64) -> LogEntry {
    LogEntry {
        timestamp: Timestamp::from_epoch_nanos(epoch_secs * 1_000_000_000),
        ..log_entry(level, message, pid)
    }
}

pub fn session(number: u64, pid: i32) -> Session {
    Session::new(number, pid, None, Timestamp::from_epoch_nanos(0))
}

pub fn tail_id(s: &str) -> TailId {
    TailId::new(s)
}

/// A `FakeClock` started at an arbitrary, recognizable non-zero instant, so
/// that tests comparing against `Timestamp::from_epoch_nanos(0)` defaults
/// can't accidentally pass by coincidence.
pub fn fake_clock() -> FakeClock {
    FakeClock::new(1_700_000_000_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_helper_sets_requested_fields() {
        let e = log_entry(Level::Error, "boom", 42);
        assert_eq!(e.level, Level::Error);
        assert_eq!(e.message, "boom");
        assert_eq!(e.pid, 42);
        assert_eq!(e.event_type.as_deref(), Some("logEvent"));
    }

    #[test]
    fn log_entry_at_sets_the_requested_instant() {
        let e = log_entry_at(Level::Info, "x", 1, 3);
        assert_eq!(e.timestamp.epoch_nanos, 3_000_000_000);
    }
}

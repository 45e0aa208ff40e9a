// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser (§4.2): converts one raw NDJSON line from the producer into a
//! typed `LogEntry`, or skips/drops it.
//!
//! Grounded on the streaming-field read in `simtail-storage::pattern_store`'s
//! JSONL replay — parse once, tolerate a malformed trailing line — except
//! here a malformed *whole* line is a hard parse error (§4.2: "not a JSON
//! object"), not something to skip silently, since the caller counts it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use simtail_core::entry::{Level, Timestamp};
use simtail_core::LogEntry;

/// Raw shape of one producer line (§6). Unknown fields are ignored by
/// `serde`'s default behavior of not rejecting them.
#[derive(Debug, Deserialize)]
struct RawLine {
    timestamp: Option<String>,
    #[serde(rename = "messageType")]
    message_type: Option<String>,
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(rename = "eventMessage")]
    event_message: Option<String>,
    #[serde(rename = "processID")]
    process_id: Option<i32>,
    #[serde(rename = "processImagePath")]
    process_image_path: Option<String>,
    #[serde(rename = "processImageUUID")]
    process_image_uuid: Option<String>,
    subsystem: Option<String>,
    category: Option<String>,
    #[serde(rename = "threadID")]
    thread_id: Option<i64>,
    #[serde(rename = "senderImagePath")]
    sender_image_path: Option<String>,
    /// Producer-supplied fallback process name, used only when
    /// `processImagePath` is absent (§4.2).
    process: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a JSON object: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// Invoked with the raw, unparseable timestamp string when the parser falls
/// back to `now()`. Hook invocations are counted by the caller, not here
/// (§4.2: "hook invocations are counted").
pub trait TimestampErrorHook: Send + Sync {
    fn on_timestamp_error(&self, raw: &str);
}

/// No-op hook for pipelines that don't care to observe timestamp fallbacks.
#[derive(Debug, Default)]
pub struct NoopTimestampErrorHook;

impl TimestampErrorHook for NoopTimestampErrorHook {
    fn on_timestamp_error(&self, _raw: &str) {}
}

/// Counts timestamp-parse fallbacks, for the `timestamp_parse_drop` summary
/// every 100 occurrences (§7).
#[derive(Debug, Default)]
pub struct CountingTimestampErrorHook {
    pub count: AtomicU64,
}

impl TimestampErrorHook for CountingTimestampErrorHook {
    fn on_timestamp_error(&self, _raw: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Converts raw NDJSON lines into `LogEntry` values (§4.2).
pub struct Parser<C> {
    clock: C,
    hook: Box<dyn TimestampErrorHook>,
}

impl<C: simtail_core::Clock> Parser<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            hook: Box::new(NoopTimestampErrorHook),
        }
    }

    pub fn with_hook(clock: C, hook: Box<dyn TimestampErrorHook>) -> Self {
        Self { clock, hook }
    }

    /// `Ok(Some(entry))`, `Ok(None)` for a non-`logEvent` activity line, or
    /// `Err` when the line is not a JSON object (§4.2).
    pub fn parse_line(&self, line: &str) -> Result<Option<LogEntry>, ParseError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| ParseError(e.to_string()))?;
        if !value.is_object() {
            return Err(ParseError("line is not a JSON object".to_string()));
        }

        let raw: RawLine = serde_json::from_value(value).map_err(|e| ParseError(e.to_string()))?;

        // Invariant (§3): a non-"logEvent" eventType that's present and
        // non-empty is an activity event, skipped at the parser boundary.
        if let Some(event_type) = raw.event_type.as_deref() {
            if !event_type.is_empty() && event_type != "logEvent" {
                return Ok(None);
            }
        }

        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(|s| s.parse::<Timestamp>().ok())
            .unwrap_or_else(|| {
                if let Some(raw_ts) = raw.timestamp.as_deref() {
                    self.hook.on_timestamp_error(raw_ts);
                }
                Timestamp::from_epoch_nanos(self.clock.now_nanos())
            });

        let level = raw
            .message_type
            .as_deref()
            .and_then(|s| s.parse::<Level>().ok())
            .unwrap_or(Level::Default);

        let process = raw
            .process_image_path
            .as_deref()
            .map(basename)
            .filter(|s| !s.is_empty())
            .or(raw.process.clone())
            .unwrap_or_default();

        Ok(Some(LogEntry {
            timestamp,
            level,
            process,
            pid: raw.process_id.unwrap_or(0),
            tid: raw.thread_id.unwrap_or(0),
            subsystem: raw.subsystem,
            category: raw.category,
            message: raw.event_message.unwrap_or_default(),
            process_path: raw.process_image_path,
            process_image_uuid: raw.process_image_uuid,
            sender_path: raw.sender_image_path,
            event_type: raw.event_type,
            session: 0,
            tail_id: None,
            dedupe_count: None,
            dedupe_first: None,
            dedupe_last: None,
        }))
    }
}

/// Basename derivation for `processImagePath` (§4.2): the last `/`-separated
/// component.
fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtail_core::FakeClock;

    fn parser() -> Parser<FakeClock> {
        Parser::new(FakeClock::new(1_700_000_000_000_000_000))
    }

    #[test]
    fn parses_a_well_formed_log_event() {
        let line = r#"{"timestamp":"2026-07-28 10:15:30.123456-0700","messageType":"Error","eventType":"logEvent","eventMessage":"boom","processID":120,"threadID":7,"processImagePath":"/usr/bin/App","subsystem":"com.example.app","category":"net"}"#;
        let entry = parser().parse_line(line).unwrap().unwrap();
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.pid, 120);
        assert_eq!(entry.tid, 7);
        assert_eq!(entry.process, "App");
        assert_eq!(entry.subsystem.as_deref(), Some("com.example.app"));
    }

    #[test]
    fn non_log_event_activity_is_skipped() {
        let line = r#"{"eventType":"activityCreate","eventMessage":"noop"}"#;
        assert_eq!(parser().parse_line(line).unwrap(), None);
    }

    #[test]
    fn empty_event_type_is_treated_as_a_log_event() {
        let line = r#"{"eventType":"","eventMessage":"still a log"}"#;
        let entry = parser().parse_line(line).unwrap().unwrap();
        assert_eq!(entry.message, "still a log");
    }

    #[test]
    fn non_object_json_is_an_error() {
        let err = parser().parse_line("[1,2,3]").unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[test]
    fn non_json_line_is_an_error() {
        assert!(parser().parse_line("not json at all").is_err());
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_now_and_invokes_hook() {
        let hook = std::sync::Arc::new(CountingTimestampErrorHook::default());
        struct ArcHook(std::sync::Arc<CountingTimestampErrorHook>);
        impl TimestampErrorHook for ArcHook {
            fn on_timestamp_error(&self, raw: &str) {
                self.0.on_timestamp_error(raw);
            }
        }
        let clock = FakeClock::new(42);
        let parser = Parser::with_hook(clock, Box::new(ArcHook(hook.clone())));

        let line = r#"{"timestamp":"garbage","eventMessage":"x"}"#;
        let entry = parser.parse_line(line).unwrap().unwrap();
        assert_eq!(entry.timestamp.epoch_nanos, 42);
        assert_eq!(hook.count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn falls_back_to_producer_process_field_when_no_image_path() {
        let line = r#"{"eventMessage":"x","process":"fallback-proc"}"#;
        let entry = parser().parse_line(line).unwrap().unwrap();
        assert_eq!(entry.process, "fallback-proc");
    }

    #[test]
    fn process_name_is_empty_when_neither_field_present() {
        let line = r#"{"eventMessage":"x"}"#;
        let entry = parser().parse_line(line).unwrap().unwrap();
        assert_eq!(entry.process, "");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let line = r#"{"eventMessage":"x","somethingElse":true,"nested":{"a":1}}"#;
        assert!(parser().parse_line(line).unwrap().is_some());
    }
}

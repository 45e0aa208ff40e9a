// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output Emitter (§4.8): the single serialization point for every outgoing
//! event. Every event is one line of NDJSON carrying at minimum `type` and
//! `schemaVersion`; fields with empty/absent values are omitted via
//! `skip_serializing_if`, never emitted as `""`.
//!
//! `serde_json` never HTML-escapes (unlike, say, Go's `encoding/json`), so
//! §4.8's "disable HTML escaping" requirement is satisfied by construction —
//! noted here rather than encoded as a runtime check, since there is no
//! escaping to disable.

use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use simtail_core::entry::Timestamp;
use simtail_core::id::TailId;

/// Schema version for the emitted event *shape* (§1, §6): stable, back-compat
/// additions only.
pub const SCHEMA_VERSION: u32 = 1;

/// Contract version for the agent-facing *behavioral* contract — ordering,
/// scoping, sidecar semantics (§6). Carried only by the event types whose
/// structure defines it (§4.8, §8).
pub const CONTRACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct LogPayload {
    pub timestamp: String,
    pub level: simtail_core::entry::Level,
    pub process: String,
    pub pid: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_id: Option<TailId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_last: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStartPayload {
    pub session: u64,
    pub pid: i32,
    pub app: String,
    pub simulator: String,
    pub udid: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_id: Option<TailId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_uuid: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionEndSummary {
    pub total_logs: u64,
    pub errors: u64,
    pub faults: u64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEndPayload {
    pub session: u64,
    pub pid: i32,
    pub summary: SessionEndSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_id: Option<TailId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryPayload {
    #[serde(rename = "windowStart")]
    pub window_start: String,
    #[serde(rename = "windowEnd")]
    pub window_end: String,
    #[serde(rename = "totalCount")]
    pub total_count: u64,
    pub levels: std::collections::HashMap<String, usize>,
    #[serde(rename = "hasErrors")]
    pub has_errors: bool,
    #[serde(rename = "hasFaults")]
    pub has_faults: bool,
    #[serde(rename = "errorRate")]
    pub error_rate: f64,
    #[serde(rename = "topErrors")]
    pub top_errors: Vec<String>,
    #[serde(rename = "topFaults")]
    pub top_faults: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPayload {
    pub timestamp: String,
    pub summary: SummaryPayload,
    pub patterns: Vec<String>,
    pub new_pattern_count: u64,
    pub known_pattern_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatPayload {
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub logs_since_last: u64,
    pub tail_id: TailId,
    pub latest_session: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_timestamp: Option<String>,
    pub contract_version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsPayload {
    pub timestamp: String,
    pub tail_id: TailId,
    pub session: u64,
    pub reconnects: u64,
    pub parse_drops: u64,
    pub channel_drops: u64,
    pub buffered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyPayload {
    pub timestamp: String,
    pub simulator: String,
    pub udid: String,
    pub app: String,
    pub tail_id: TailId,
    pub session: u64,
    pub contract_version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconnectNoticePayload {
    pub message: String,
    pub tail_id: TailId,
    pub severity: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapPayload {
    pub from_timestamp: String,
    pub to_timestamp: String,
    pub tail_id: TailId,
    pub session: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfilled_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearBufferPayload {
    pub reason: String,
    pub tail_id: TailId,
    pub session: u64,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataPayload {
    pub version: String,
    pub commit: String,
    pub build_date: String,
    pub contract_version: u32,
}

/// Static build identifiers for the once-at-startup `metadata` event
/// (§4.8). `BUILD_GIT_HASH`/`BUILD_DATE` are meant to be set by the build
/// environment (mirroring the teacher daemon's
/// `concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"))`
/// version string); unlike the teacher we read them with `option_env!` and
/// fall back to `"unknown"` rather than failing the build, since this
/// workspace has no build script wiring them in yet.
pub fn metadata_payload() -> MetadataPayload {
    MetadataPayload {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("BUILD_GIT_HASH").unwrap_or("unknown").to_string(),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown").to_string(),
        contract_version: CONTRACT_VERSION,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Tagged variant over every emittable event (§4.8, §9: "polymorphism across
/// event types represented with a tagged variant plus a single emit
/// method").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    Log(LogPayload),
    SessionStart(SessionStartPayload),
    SessionEnd(SessionEndPayload),
    Summary(SummaryPayload),
    Analysis(AnalysisPayload),
    Heartbeat(HeartbeatPayload),
    Stats(StatsPayload),
    Ready(ReadyPayload),
    ReconnectNotice(ReconnectNoticePayload),
    GapDetected(GapPayload),
    GapFilled(GapPayload),
    ClearBuffer(ClearBufferPayload),
    Metadata(MetadataPayload),
    Error(ErrorPayload),
}

impl OutputEvent {
    /// Renders to the exact JSON object emitted on the wire, with
    /// `schemaVersion` merged in alongside the `type` tag.
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("schemaVersion".to_string(), Value::from(SCHEMA_VERSION));
        }
        value
    }
}

/// Formats a `Timestamp` as RFC3339 with nanosecond precision, preserving
/// the originally observed UTC offset (§3: "timezone-preserving").
pub fn format_timestamp(ts: &Timestamp) -> String {
    let local_nanos = ts.epoch_nanos + i64::from(ts.utc_offset_secs) * 1_000_000_000;
    let days = local_nanos.div_euclid(86_400_000_000_000);
    let nanos_of_day = local_nanos.rem_euclid(86_400_000_000_000);
    let (y, m, d) = civil_from_days(days);
    let secs_of_day = nanos_of_day / 1_000_000_000;
    let nanos = nanos_of_day % 1_000_000_000;
    let hh = secs_of_day / 3600;
    let mm = (secs_of_day % 3600) / 60;
    let ss = secs_of_day % 60;

    let off = ts.utc_offset_secs;
    let sign = if off < 0 { '-' } else { '+' };
    let off_abs = off.unsigned_abs();
    let off_hh = off_abs / 3600;
    let off_mm = (off_abs % 3600) / 60;

    format!(
        "{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}.{nanos:09}{sign}{off_hh:02}:{off_mm:02}"
    )
}

/// Inverse of `entry::days_from_civil`: days-since-epoch to a Y-M-D triple,
/// Howard Hinnant's usual dependency-free algorithm.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Single writer behind one lock (§5: "emitter writer: serializes all
/// outgoing events behind a single writer"). Writes UTF-8 NDJSON, LF
/// terminated, no BOM.
pub struct Emitter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> Emitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    /// Serializes and writes one event as a single NDJSON line.
    pub fn emit(&self, event: &OutputEvent) -> std::io::Result<()> {
        let json = event.to_json();
        let mut line = serde_json::to_string(&json).unwrap_or_default();
        line.push('\n');
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_carries_type_and_schema_version() {
        let event = OutputEvent::Error(ErrorPayload {
            code: "invalid_regex".to_string(),
            message: "bad pattern".to_string(),
            hint: None,
        });
        let json = event.to_json();
        assert_eq!(json["type"], "error");
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert!(json.get("hint").is_none());
    }

    #[test]
    fn contract_version_carrying_events_carry_it() {
        let event = OutputEvent::Ready(ReadyPayload {
            timestamp: "2026-01-01T00:00:00.000000000+00:00".to_string(),
            simulator: "iPhone 15".to_string(),
            udid: "ABC".to_string(),
            app: "com.example.app".to_string(),
            tail_id: TailId::new("t-1"),
            session: 0,
            contract_version: CONTRACT_VERSION,
        });
        let json = event.to_json();
        assert_eq!(json["contract_version"], CONTRACT_VERSION);
    }

    #[test]
    fn log_event_tag_is_snake_case() {
        let event = OutputEvent::SessionStart(SessionStartPayload {
            session: 1,
            pid: 100,
            app: "App".to_string(),
            simulator: "iPhone 15".to_string(),
            udid: "ABC".to_string(),
            timestamp: "2026-01-01T00:00:00.000000000+00:00".to_string(),
            alert: None,
            previous_pid: None,
            tail_id: None,
            version: None,
            build: None,
            binary_uuid: None,
        });
        assert_eq!(event.to_json()["type"], "session_start");
    }

    #[test]
    fn emitter_writes_lf_terminated_lines_into_a_shared_buffer() {
        use std::sync::Arc;

        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let shared = Arc::new(Mutex::new(Vec::new()));
        let emitter = Emitter::new(SharedBuf(shared.clone()));
        emitter
            .emit(&OutputEvent::Error(ErrorPayload {
                code: "x".to_string(),
                message: "y".to_string(),
                hint: None,
            }))
            .unwrap();

        let written = shared.lock().clone();
        let text = String::from_utf8(written).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.contains("\"type\":\"error\""));
    }

    #[test]
    fn format_timestamp_round_trips_date_components() {
        let ts: Timestamp = "2026-07-28 10:15:30.123456789-0700".parse().unwrap();
        let rendered = format_timestamp(&ts);
        assert_eq!(rendered, "2026-07-28T10:15:30.123456789-07:00");
    }

    #[test]
    fn metadata_payload_carries_contract_version_and_crate_version() {
        let payload = metadata_payload();
        assert_eq!(payload.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(payload.contract_version, CONTRACT_VERSION);
        let event = OutputEvent::Metadata(payload);
        assert_eq!(event.to_json()["type"], "metadata");
    }

    #[test]
    fn format_timestamp_handles_utc() {
        let ts = Timestamp::from_epoch_nanos(0);
        assert_eq!(format_timestamp(&ts), "1970-01-01T00:00:00.000000000+00:00");
    }
}

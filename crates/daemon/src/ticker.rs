// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stats & Heartbeat Ticker (§4.9): periodic `heartbeat` and `summary`
//! events computed over the ring buffer's recent window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;

use simtail_core::entry::{Level, LogEntry, Timestamp};
use simtail_core::id::TailId;

use crate::emitter::{format_timestamp, HeartbeatPayload, SummaryPayload};

const NORMALIZED_MESSAGE_MAX_LEN: usize = 100;
const TOP_K: usize = 5;

#[allow(clippy::expect_used)]
fn hex_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0[xX][0-9a-fA-F]+").expect("valid hex regex"))
}

#[allow(clippy::expect_used)]
fn uuid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("valid uuid regex")
    })
}

#[allow(clippy::expect_used)]
fn integer_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid integer regex"))
}

/// Collapses hex addresses, UUIDs and bare integer runs into placeholders,
/// then truncates to 100 characters (§4.9).
pub fn normalize_message(message: &str) -> String {
    let collapsed = uuid_pattern().replace_all(message, "<uuid>");
    let collapsed = hex_pattern().replace_all(&collapsed, "<hex>");
    let collapsed = integer_run_pattern().replace_all(&collapsed, "<n>");
    collapsed.chars().take(NORMALIZED_MESSAGE_MAX_LEN).collect()
}

fn top_k_normalized(entries: &[LogEntry], level: Level) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for entry in entries {
        if entry.level != level {
            continue;
        }
        let normalized = normalize_message(&entry.message);
        if !counts.contains_key(&normalized) {
            order.push(normalized.clone());
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]).then_with(|| a.cmp(b)));
    order.into_iter().take(TOP_K).collect()
}

/// Builds `summary` events over a snapshot of the ring buffer (§4.9).
pub fn build_summary(entries: &[LogEntry], window_start: Timestamp, window_end: Timestamp) -> SummaryPayload {
    let mut levels: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        *levels.entry(entry.level.to_string()).or_insert(0) += 1;
    }
    let total_count = entries.len() as u64;
    let errors = levels.get("error").copied().unwrap_or(0);
    let faults = levels.get("fault").copied().unwrap_or(0);
    let error_rate = if total_count == 0 {
        0.0
    } else {
        (errors + faults) as f64 / total_count as f64
    };

    SummaryPayload {
        window_start: format_timestamp(&window_start),
        window_end: format_timestamp(&window_end),
        total_count,
        levels,
        has_errors: errors > 0,
        has_faults: faults > 0,
        error_rate,
        top_errors: top_k_normalized(entries, Level::Error),
        top_faults: top_k_normalized(entries, Level::Fault),
    }
}

/// Tracks the per-tick delivery state needed to build `heartbeat` events:
/// count of logs delivered since the previous tick and the timestamp of the
/// last one (§4.9).
pub struct Ticker {
    started_at: Timestamp,
    logs_since_last: AtomicU64,
    last_seen: Mutex<Option<Timestamp>>,
}

impl Ticker {
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            started_at,
            logs_since_last: AtomicU64::new(0),
            last_seen: Mutex::new(None),
        }
    }

    /// Called by the pipeline for every entry that reaches the emitter.
    pub fn record_delivered(&self, entry: &LogEntry) {
        self.logs_since_last.fetch_add(1, Ordering::Relaxed);
        *self.last_seen.lock() = Some(entry.timestamp);
    }

    /// Builds one `heartbeat` event and resets the since-last counter.
    pub fn build_heartbeat(&self, now: Timestamp, tail_id: TailId, latest_session: u64) -> HeartbeatPayload {
        let logs_since_last = self.logs_since_last.swap(0, Ordering::Relaxed);
        let uptime_seconds =
            (now.epoch_nanos - self.started_at.epoch_nanos).max(0) as f64 / 1_000_000_000.0;
        let last_seen_timestamp = self.last_seen.lock().as_ref().map(format_timestamp);

        HeartbeatPayload {
            timestamp: format_timestamp(&now),
            uptime_seconds,
            logs_since_last,
            tail_id,
            latest_session,
            last_seen_timestamp,
            contract_version: crate::emitter::CONTRACT_VERSION,
        }
    }
}

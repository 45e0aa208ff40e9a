// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PatternStore`: maps a normalized log-message pattern to `{first_seen,
//! last_seen, total_count}` (§6). The core only ever calls `is_known` and
//! `record`; this module owns the on-disk format.
//!
//! `JsonlPatternStore` is grounded on `oj-storage`'s `wal.rs` append/recover
//! idiom — append-only JSON lines, rebuild the in-memory index by replay on
//! open — but deliberately much smaller: a pattern store is a best-effort
//! cache, not a durability boundary, so there is no group commit, no
//! corruption-rotation-to-`.bak`, and no sequence numbers.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the store tracks per distinct normalized pattern. Schema carries an
/// explicit version so a future on-disk format change can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub first_seen_epoch_nanos: i64,
    pub last_seen_epoch_nanos: i64,
    pub total_count: u64,
}

impl PatternRecord {
    fn new(now_nanos: i64, count: u64) -> Self {
        Self {
            first_seen_epoch_nanos: now_nanos,
            last_seen_epoch_nanos: now_nanos,
            total_count: count,
        }
    }

    fn merge(&mut self, now_nanos: i64, count: u64) {
        self.last_seen_epoch_nanos = now_nanos;
        self.total_count += count;
    }
}

/// Current on-disk schema version for `JsonlPatternStore` records.
const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct RecordLineRef<'a> {
    schema_version: u32,
    pattern: &'a str,
    #[serde(flatten)]
    record: &'a PatternRecord,
}

#[derive(Deserialize)]
struct RecordLine {
    #[allow(dead_code)]
    schema_version: u32,
    pattern: String,
    #[serde(flatten)]
    record: PatternRecord,
}

/// Durable, shared handle to normalized-pattern knowledge. The core consumes
/// only `is_known`/`record`; everything else is this crate's business.
pub trait PatternStore: Send + Sync {
    fn is_known(&self, pattern: &str) -> bool;

    /// Records `count` additional observations of `pattern` at the current
    /// instant (epoch nanoseconds), creating the entry if new.
    fn record(&self, pattern: &str, count: u64, now_nanos: i64);

    /// Snapshot of everything currently known, for `analysis` events.
    fn snapshot(&self) -> HashMap<String, PatternRecord>;
}

/// Default store used when the pipeline has no on-disk pattern store
/// configured. Never persists anything.
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    index: Mutex<HashMap<String, PatternRecord>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatternStore for InMemoryPatternStore {
    fn is_known(&self, pattern: &str) -> bool {
        self.index.lock().contains_key(pattern)
    }

    fn record(&self, pattern: &str, count: u64, now_nanos: i64) {
        let mut index = self.index.lock();
        index
            .entry(pattern.to_string())
            .and_modify(|r| r.merge(now_nanos, count))
            .or_insert_with(|| PatternRecord::new(now_nanos, count));
    }

    fn snapshot(&self) -> HashMap<String, PatternRecord> {
        self.index.lock().clone()
    }
}

/// Append-only JSONL pattern store. Replays the whole file on `open` to
/// rebuild the in-memory index, then appends one line per `record` call.
/// A malformed trailing line is skipped rather than treated as fatal: this
/// is a cache, losing its tail is not a correctness problem.
pub struct JsonlPatternStore {
    path: PathBuf,
    file: Mutex<File>,
    index: Mutex<HashMap<String, PatternRecord>>,
}

impl JsonlPatternStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let read_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let index = Self::replay(&read_file);
        let append_file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(append_file),
            index: Mutex::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(file: &File) -> HashMap<String, PatternRecord> {
        let mut index = HashMap::new();
        let reader = BufReader::new(file.try_clone().expect("clone read handle"));
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<RecordLine>(&line) else {
                continue;
            };
            index
                .entry(parsed.pattern)
                .and_modify(|existing: &mut PatternRecord| {
                    existing.last_seen_epoch_nanos = parsed.record.last_seen_epoch_nanos;
                    existing.total_count += parsed.record.total_count;
                })
                .or_insert(parsed.record);
        }
        index
    }
}

impl PatternStore for JsonlPatternStore {
    fn is_known(&self, pattern: &str) -> bool {
        self.index.lock().contains_key(pattern)
    }

    fn record(&self, pattern: &str, count: u64, now_nanos: i64) {
        let record = {
            let mut index = self.index.lock();
            let entry = index
                .entry(pattern.to_string())
                .and_modify(|r| r.merge(now_nanos, count))
                .or_insert_with(|| PatternRecord::new(now_nanos, count));
            *entry
        };

        let line = RecordLineRef {
            schema_version: SCHEMA_VERSION,
            pattern,
            record: &record,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            let mut file = self.file.lock();
            let _ = writeln!(file, "{json}");
        }
    }

    fn snapshot(&self) -> HashMap<String, PatternRecord> {
        self.index.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn in_memory_store_tracks_is_known_and_counts() {
        let store = InMemoryPatternStore::new();
        assert!(!store.is_known("conn timeout"));
        store.record("conn timeout", 1, 100);
        assert!(store.is_known("conn timeout"));
        store.record("conn timeout", 2, 200);
        let snap = store.snapshot();
        let rec = snap.get("conn timeout").unwrap();
        assert_eq!(rec.total_count, 3);
        assert_eq!(rec.first_seen_epoch_nanos, 100);
        assert_eq!(rec.last_seen_epoch_nanos, 200);
    }

    #[test]
    fn jsonl_store_persists_and_replays_on_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("patterns.jsonl");

        {
            let store = JsonlPatternStore::open(&path).expect("open");
            store.record("timeout", 1, 100);
            store.record("timeout", 1, 200);
            store.record("crash", 5, 150);
        }

        let reopened = JsonlPatternStore::open(&path).expect("reopen");
        assert!(reopened.is_known("timeout"));
        assert!(reopened.is_known("crash"));
        let snap = reopened.snapshot();
        assert_eq!(snap.get("timeout").unwrap().total_count, 2);
        assert_eq!(snap.get("crash").unwrap().total_count, 5);
    }

    #[test]
    fn jsonl_store_skips_malformed_trailing_line() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("patterns.jsonl");
        {
            let store = JsonlPatternStore::open(&path).expect("open");
            store.record("ok", 1, 10);
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).expect("append");
            writeln!(f, "not json at all").unwrap();
        }
        let reopened = JsonlPatternStore::open(&path).expect("reopen despite garbage");
        assert!(reopened.is_known("ok"));
        assert!(!reopened.is_known("not json at all"));
    }

    #[test]
    fn unknown_pattern_is_not_known() {
        let store = InMemoryPatternStore::new();
        assert!(!store.is_known("never seen"));
    }
}

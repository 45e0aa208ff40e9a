// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session data model (§3). The stateful transition logic that produces
//! these values lives in `simtail-daemon::tracker` — this module only
//! defines the shapes.

use serde::{Deserialize, Serialize};

use crate::entry::Timestamp;

/// A logical run of the observed process, bounded by PID/binary-UUID change
/// or idle rollover. Session numbers start at 1 and are never reused within
/// one tail invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub number: u64,
    pub pid: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_uuid: Option<String>,
    pub started_at: Timestamp,
    pub total_logs: u64,
    pub errors: u64,
    pub faults: u64,
}

impl Session {
    pub fn new(number: u64, pid: i32, binary_uuid: Option<String>, started_at: Timestamp) -> Self {
        Self {
            number,
            pid,
            binary_uuid,
            started_at,
            total_logs: 0,
            errors: 0,
            faults: 0,
        }
    }

    pub fn summary(&self, ended_at: Timestamp) -> SessionSummary {
        let duration_seconds = (ended_at.epoch_nanos - self.started_at.epoch_nanos)
            .max(0) as f64
            / 1_000_000_000.0;
        SessionSummary {
            total_logs: self.total_logs,
            errors: self.errors,
            faults: self.faults,
            duration_seconds,
        }
    }
}

/// Terminal counters for a session, emitted on `session_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_logs: u64,
    pub errors: u64,
    pub faults: u64,
    pub duration_seconds: f64,
}

/// Machine-readable alert attached to a `session_start` caused by a
/// detected relaunch rather than the first session of the invocation.
pub const ALERT_APP_RELAUNCHED: &str = "APP_RELAUNCHED";

/// What `check_entry`/`force_rollover` produced for one observed entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTransition {
    /// No session boundary; the entry belongs to the already-open session.
    None,
    /// The very first session of the tail invocation.
    Start {
        session: Session,
    },
    /// A session ended and a new one began in the same instant, e.g. on a
    /// PID change or a forced idle rollover.
    Rollover {
        ended: Session,
        ended_summary: SessionSummary,
        started: Session,
        alert: Option<&'static str>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_computes_duration_from_started_at() {
        let session = Session {
            total_logs: 3,
            errors: 1,
            faults: 0,
            ..Session::new(1, 100, None, Timestamp::from_epoch_nanos(0))
        };
        let summary = session.summary(Timestamp::from_epoch_nanos(2_000_000_000));
        assert_eq!(summary.duration_seconds, 2.0);
        assert_eq!(summary.total_logs, 3);
    }
}

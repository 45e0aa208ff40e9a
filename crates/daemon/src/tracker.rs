// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Tracker (§4.7): derives session boundaries from PID / binary-UUID
//! change and timed idle rollover, maintaining per-session counters.
//!
//! The data shapes (`Session`, `SessionSummary`, `SessionTransition`) live in
//! `simtail-core::session`; this module owns the stateful transition logic,
//! guarded by a single lock per the concurrency model in §5.

use parking_lot::Mutex;
use simtail_core::entry::{Level, LogEntry, Timestamp};
use simtail_core::session::{Session, SessionTransition, ALERT_APP_RELAUNCHED};

struct TrackerState {
    initialized: bool,
    current: Session,
}

/// Static context carried on every `session_start` (§4.7).
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub app: String,
    pub simulator: String,
    pub udid: String,
    pub version: Option<String>,
    pub build: Option<String>,
}

/// Stateful session boundary detector; one instance per pipeline (§5:
/// "session tracker: guarded by a single lock; all transitions are
/// serialised").
pub struct SessionTracker {
    state: Mutex<Option<TrackerState>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self { state: Mutex::new(None) }
    }

    /// Drives one observed entry through the transition rules in §4.7.
    pub fn check_entry(&self, entry: &LogEntry) -> SessionTransition {
        let mut guard = self.state.lock();

        let Some(state) = guard.as_mut() else {
            let mut session = Session::new(
                1,
                entry.pid,
                entry.process_image_uuid.clone(),
                entry.timestamp,
            );
            bump_counters(&mut session, entry);
            *guard = Some(TrackerState {
                initialized: true,
                current: session.clone(),
            });
            return SessionTransition::Start { session };
        };

        let relaunched = (entry.pid > 0 && entry.pid != state.current.pid)
            || entry
                .process_image_uuid
                .as_deref()
                .is_some_and(|uuid| !uuid.is_empty() && Some(uuid) != state.current.binary_uuid.as_deref());

        if relaunched {
            let ended = state.current.clone();
            let ended_summary = ended.summary(entry.timestamp);
            let next_number = ended.number + 1;
            let mut started = Session::new(
                next_number,
                entry.pid,
                entry.process_image_uuid.clone(),
                entry.timestamp,
            );
            bump_counters(&mut started, entry);
            state.current = started.clone();
            return SessionTransition::Rollover {
                ended,
                ended_summary,
                started,
                alert: Some(ALERT_APP_RELAUNCHED),
            };
        }

        bump_counters(&mut state.current, entry);
        SessionTransition::None
    }

    /// Ends the current session and begins a new one with the same PID but
    /// fresh counters (§4.7: used by idle timeout). No-op before the
    /// tracker has ever been initialized.
    pub fn force_rollover(&self, alert: &'static str, at: Timestamp) -> Option<SessionTransition> {
        let mut guard = self.state.lock();
        let state = guard.as_mut()?;

        let ended = state.current.clone();
        let ended_summary = ended.summary(at);
        let started = Session::new(ended.number + 1, ended.pid, ended.binary_uuid.clone(), at);
        state.current = started.clone();

        Some(SessionTransition::Rollover {
            ended,
            ended_summary,
            started,
            alert: Some(alert),
        })
    }

    /// Describes the currently-open session for pipeline teardown (§4.7).
    /// `None` if the tracker was never initialized.
    pub fn get_final_summary(&self, at: Timestamp) -> Option<(Session, simtail_core::session::SessionSummary)> {
        let guard = self.state.lock();
        let state = guard.as_ref()?;
        if !state.initialized {
            return None;
        }
        let summary = state.current.summary(at);
        Some((state.current.clone(), summary))
    }

    pub fn current_session_number(&self) -> u64 {
        self.state.lock().as_ref().map(|s| s.current.number).unwrap_or(0)
    }
}

fn bump_counters(session: &mut Session, entry: &LogEntry) {
    session.total_logs += 1;
    match entry.level {
        Level::Error => session.errors += 1,
        Level::Fault => session.faults += 1,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtail_core::test_support::log_entry;

    fn entry_with_pid(pid: i32, level: Level) -> LogEntry {
        log_entry(level, "x", pid)
    }

    #[test]
    fn first_entry_starts_session_one_with_no_alert() {
        let tracker = SessionTracker::new();
        let transition = tracker.check_entry(&entry_with_pid(12345, Level::Info));
        match transition {
            SessionTransition::Start { session } => {
                assert_eq!(session.number, 1);
                assert_eq!(session.pid, 12345);
                assert_eq!(session.total_logs, 1);
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn s2_session_change_on_pid() {
        let tracker = SessionTracker::new();

        let t1 = tracker.check_entry(&entry_with_pid(12345, Level::Info));
        assert!(matches!(t1, SessionTransition::Start { .. }));

        let t2 = tracker.check_entry(&entry_with_pid(12345, Level::Error));
        assert_eq!(t2, SessionTransition::None);

        let t3 = tracker.check_entry(&entry_with_pid(67890, Level::Info));
        match t3 {
            SessionTransition::Rollover {
                ended,
                ended_summary,
                started,
                alert,
            } => {
                assert_eq!(ended.number, 1);
                assert_eq!(ended.pid, 12345);
                assert_eq!(ended_summary.total_logs, 2);
                assert_eq!(ended_summary.errors, 1);
                assert_eq!(started.number, 2);
                assert_eq!(started.pid, 67890);
                assert_eq!(alert, Some(ALERT_APP_RELAUNCHED));
            }
            other => panic!("expected Rollover, got {other:?}"),
        }
        assert_eq!(tracker.current_session_number(), 2);
    }

    #[test]
    fn binary_uuid_change_also_triggers_rollover() {
        let tracker = SessionTracker::new();
        let mut first = entry_with_pid(100, Level::Info);
        first.process_image_uuid = Some("uuid-a".to_string());
        tracker.check_entry(&first);

        let mut second = entry_with_pid(100, Level::Info);
        second.process_image_uuid = Some("uuid-b".to_string());
        let transition = tracker.check_entry(&second);
        assert!(matches!(transition, SessionTransition::Rollover { .. }));
    }

    #[test]
    fn session_numbers_are_strictly_monotonic_across_pid_changes() {
        let tracker = SessionTracker::new();
        tracker.check_entry(&entry_with_pid(1, Level::Info));
        for pid in 2..6 {
            let transition = tracker.check_entry(&entry_with_pid(pid, Level::Info));
            let SessionTransition::Rollover { started, .. } = transition else {
                panic!("expected rollover");
            };
            assert_eq!(started.number, pid as u64);
        }
    }

    #[test]
    fn force_rollover_keeps_pid_but_resets_counters() {
        let tracker = SessionTracker::new();
        tracker.check_entry(&entry_with_pid(100, Level::Error));
        tracker.check_entry(&entry_with_pid(100, Level::Error));

        let transition = tracker
            .force_rollover("SESSION_IDLE", Timestamp::from_epoch_nanos(5_000_000_000))
            .unwrap();
        let SessionTransition::Rollover { ended, started, alert, .. } = transition else {
            panic!("expected rollover");
        };
        assert_eq!(ended.errors, 2);
        assert_eq!(started.pid, 100);
        assert_eq!(started.errors, 0);
        assert_eq!(alert, Some("SESSION_IDLE"));
    }

    #[test]
    fn force_rollover_before_init_is_a_no_op() {
        let tracker = SessionTracker::new();
        assert!(tracker
            .force_rollover("SESSION_IDLE", Timestamp::from_epoch_nanos(0))
            .is_none());
    }

    #[test]
    fn final_summary_is_none_before_init() {
        let tracker = SessionTracker::new();
        assert!(tracker.get_final_summary(Timestamp::from_epoch_nanos(0)).is_none());
    }

    #[test]
    fn final_summary_describes_the_open_session() {
        let tracker = SessionTracker::new();
        tracker.check_entry(&entry_with_pid(1, Level::Fault));
        let (session, summary) = tracker
            .get_final_summary(Timestamp::from_epoch_nanos(2_000_000_000))
            .unwrap();
        assert_eq!(session.number, 1);
        assert_eq!(summary.faults, 1);
    }
}

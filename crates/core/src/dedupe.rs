// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dedupe Filter (§4.5): collapses consecutive or windowed-identical
//! messages and tracks occurrence counts for periodic collapsed summaries.

use std::collections::HashMap;

use crate::entry::Timestamp;

/// `Consecutive`: only the currently-repeating message is tracked.
/// `Windowed(window)`: per-message re-emission is allowed once
/// `now - last_seen > window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeMode {
    Consecutive,
    Windowed { window_nanos: i64 },
}

impl DedupeMode {
    /// `window <= 0` is `Consecutive` per §4.5 ("window = 0").
    pub fn from_window_nanos(window_nanos: i64) -> Self {
        if window_nanos > 0 {
            DedupeMode::Windowed { window_nanos }
        } else {
            DedupeMode::Consecutive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeResult {
    pub should_emit: bool,
    pub count: u64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct DedupeState {
    count: u64,
    first_seen: Timestamp,
    last_seen: Timestamp,
}

/// Stateful filter; one instance per pipeline session.
#[derive(Debug)]
pub struct DedupeFilter {
    mode: DedupeMode,
    // Consecutive mode: only ever holds the single currently-repeating key.
    consecutive: Option<(String, DedupeState)>,
    // Windowed mode: per-message-key state.
    windowed: HashMap<String, DedupeState>,
}

impl DedupeFilter {
    pub fn new(mode: DedupeMode) -> Self {
        Self {
            mode,
            consecutive: None,
            windowed: HashMap::new(),
        }
    }

    /// Checks one message, returning whether it should be emitted and the
    /// running occurrence count for the collapsed duplicate it belongs to.
    pub fn check(&mut self, message: &str, timestamp: Timestamp) -> DedupeResult {
        match self.mode {
            DedupeMode::Consecutive => self.check_consecutive(message, timestamp),
            DedupeMode::Windowed { window_nanos } => {
                self.check_windowed(message, timestamp, window_nanos)
            }
        }
    }

    fn check_consecutive(&mut self, message: &str, timestamp: Timestamp) -> DedupeResult {
        match &mut self.consecutive {
            Some((key, state)) if key == message => {
                state.count += 1;
                state.last_seen = timestamp;
                DedupeResult {
                    should_emit: false,
                    count: state.count,
                    first_seen: state.first_seen,
                    last_seen: state.last_seen,
                }
            }
            _ => {
                let state = DedupeState {
                    count: 1,
                    first_seen: timestamp,
                    last_seen: timestamp,
                };
                self.consecutive = Some((message.to_string(), state));
                DedupeResult {
                    should_emit: true,
                    count: 1,
                    first_seen: timestamp,
                    last_seen: timestamp,
                }
            }
        }
    }

    fn check_windowed(
        &mut self,
        message: &str,
        timestamp: Timestamp,
        window_nanos: i64,
    ) -> DedupeResult {
        match self.windowed.get_mut(message) {
            Some(state) => {
                let elapsed = timestamp.epoch_nanos - state.last_seen.epoch_nanos;
                if elapsed > window_nanos {
                    // Window expired: treat as a fresh occurrence.
                    *state = DedupeState {
                        count: 1,
                        first_seen: timestamp,
                        last_seen: timestamp,
                    };
                    DedupeResult {
                        should_emit: true,
                        count: 1,
                        first_seen: timestamp,
                        last_seen: timestamp,
                    }
                } else {
                    state.count += 1;
                    state.last_seen = timestamp;
                    DedupeResult {
                        should_emit: false,
                        count: state.count,
                        first_seen: state.first_seen,
                        last_seen: state.last_seen,
                    }
                }
            }
            None => {
                let state = DedupeState {
                    count: 1,
                    first_seen: timestamp,
                    last_seen: timestamp,
                };
                self.windowed.insert(message.to_string(), state);
                DedupeResult {
                    should_emit: true,
                    count: 1,
                    first_seen: timestamp,
                    last_seen: timestamp,
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = None;
        self.windowed.clear();
    }

    /// Per-key pending counts, for a periodic flush of collapsed summaries.
    pub fn get_pending_duplicates(&self) -> HashMap<String, u64> {
        match self.mode {
            DedupeMode::Consecutive => self
                .consecutive
                .iter()
                .map(|(k, s)| (k.clone(), s.count))
                .collect(),
            DedupeMode::Windowed { .. } => {
                self.windowed.iter().map(|(k, s)| (k.clone(), s.count)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_nanos(secs * 1_000_000_000)
    }

    #[test]
    fn consecutive_run_of_identical_messages_emits_once_and_counts_k() {
        let mut filter = DedupeFilter::new(DedupeMode::Consecutive);
        let mut emitted = 0;
        let mut last_count = 0;
        for i in 0..5 {
            let r = filter.check("repeat", ts(i));
            if r.should_emit {
                emitted += 1;
            }
            last_count = r.count;
        }
        assert_eq!(emitted, 1);
        assert_eq!(last_count, 5);
    }

    #[test]
    fn consecutive_different_message_resets_and_reemits() {
        let mut filter = DedupeFilter::new(DedupeMode::Consecutive);
        assert!(filter.check("a", ts(0)).should_emit);
        assert!(!filter.check("a", ts(1)).should_emit);
        assert!(filter.check("b", ts(2)).should_emit);
    }

    #[test]
    fn s3_windowed_dedupe_scenario() {
        // Window=5s. Entries with message "repeat" at t=0s, 3s, 10s.
        let mut filter = DedupeFilter::new(DedupeMode::from_window_nanos(5_000_000_000));
        let r0 = filter.check("repeat", ts(0));
        assert!(r0.should_emit);
        assert_eq!(r0.count, 1);

        let r3 = filter.check("repeat", ts(3));
        assert!(!r3.should_emit);
        assert_eq!(r3.count, 2);

        let r10 = filter.check("repeat", ts(10));
        assert!(r10.should_emit);
        assert_eq!(r10.count, 1);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut filter = DedupeFilter::new(DedupeMode::Consecutive);
        filter.check("a", ts(0));
        filter.reset();
        assert!(filter.check("a", ts(1)).should_emit);
    }

    #[test]
    fn pending_duplicates_reports_per_key_counts() {
        let mut filter = DedupeFilter::new(DedupeMode::from_window_nanos(5_000_000_000));
        filter.check("a", ts(0));
        filter.check("a", ts(1));
        filter.check("b", ts(0));
        let pending = filter.get_pending_duplicates();
        assert_eq!(pending.get("a"), Some(&2));
        assert_eq!(pending.get("b"), Some(&1));
    }
}

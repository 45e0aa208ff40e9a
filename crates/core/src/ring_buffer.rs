// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity ring buffer of recently observed entries (§4.6).

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::entry::{Level, LogEntry};

const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity circular store, oldest entry evicted first once full.
///
/// Not thread-safe on its own — `SharedRingBuffer` wraps one behind a
/// single `RwLock` per the concurrency model in §5 (writer-exclusive,
/// readers shared).
#[derive(Debug)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// `capacity <= 0` is normalized to the default of 100.
    pub fn new(capacity: i64) -> Self {
        let capacity = if capacity <= 0 {
            DEFAULT_CAPACITY
        } else {
            capacity as usize
        };
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// O(1): overwrites the oldest slot when full.
    pub fn push(&mut self, entry: T) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Snapshot in oldest-to-newest arrival order.
    pub fn get_all(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    /// Snapshot of the newest `min(n, count)` entries, oldest-first.
    pub fn get_last(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

impl RingBuffer<LogEntry> {
    pub fn count_by_level(&self) -> HashMap<Level, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.level).or_insert(0) += 1;
        }
        counts
    }
}

/// Thread-safe wrapper: single lock, writer-exclusive, readers shared.
/// Readers always get an owned copy, never a borrow into the guarded state.
#[derive(Debug)]
pub struct SharedRingBuffer<T> {
    inner: RwLock<RingBuffer<T>>,
}

impl<T> SharedRingBuffer<T> {
    pub fn new(capacity: i64) -> Self {
        Self {
            inner: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    pub fn push(&self, entry: T) {
        self.inner.write().push(entry);
    }

    pub fn count(&self) -> usize {
        self.inner.read().count()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl<T: Clone> SharedRingBuffer<T> {
    pub fn get_all(&self) -> Vec<T> {
        self.inner.read().get_all()
    }

    pub fn get_last(&self, n: usize) -> Vec<T> {
        self.inner.read().get_last(n)
    }
}

impl SharedRingBuffer<LogEntry> {
    pub fn count_by_level(&self) -> HashMap<Level, usize> {
        self.inner.read().count_by_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_keeps_newest_n_in_arrival_order() {
        let mut buf: RingBuffer<&str> = RingBuffer::new(3);
        for s in ["1", "2", "3", "4", "5"] {
            buf.push(s);
        }
        assert_eq!(buf.get_all(), vec!["3", "4", "5"]);
        assert_eq!(buf.get_last(2), vec!["4", "5"]);
        assert_eq!(buf.count(), 3);
    }

    #[test]
    fn non_positive_capacity_normalizes_to_100() {
        let buf: RingBuffer<u8> = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 100);
        let buf: RingBuffer<u8> = RingBuffer::new(-5);
        assert_eq!(buf.capacity(), 100);
    }

    #[test]
    fn get_last_with_n_greater_than_count_returns_all() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(5);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.get_last(100), vec![1, 2]);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(5);
        buf.push(1);
        buf.clear();
        assert_eq!(buf.count(), 0);
        assert!(buf.get_all().is_empty());
    }

    proptest::proptest! {
        #[test]
        fn push_all_matches_last_min_n_len_elements(
            cap in 1usize..20,
            items in proptest::collection::vec(0i32..1000, 0..200),
        ) {
            let mut buf: RingBuffer<i32> = RingBuffer::new(cap as i64);
            for &i in &items {
                buf.push(i);
            }
            let expected_len = items.len().min(cap);
            let expected: Vec<i32> = items[items.len() - expected_len..].to_vec();
            proptest::prop_assert_eq!(buf.get_all(), expected);
            proptest::prop_assert_eq!(buf.count(), expected_len);
        }
    }
}

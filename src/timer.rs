//! Timer heap for delay deadlines.
//!
//! A min-heap of pending timers ordered by deadline, then by insertion
//! sequence, so expiry order is fully deterministic. Cancellation is
//! tombstone-based: a cancelled id is remembered and its entry discarded
//! when it surfaces, without restructuring the heap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::promise::Settle;
use crate::types::{Time, TimerId};

struct TimerEntry {
    deadline: Time,
    seq: u64,
    id: TimerId,
    settle: Settle,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap: earliest deadline first, then
        // lowest insertion sequence.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of pending timers.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    pending: HashSet<TimerId>,
    cancelled: HashSet<TimerId>,
    next_seq: u64,
}

impl TimerHeap {
    /// Number of live (not cancelled) timers.
    pub(crate) fn live(&self) -> usize {
        self.pending.len()
    }

    /// Adds a timer that settles the given handle at its deadline.
    pub(crate) fn insert(&mut self, id: TimerId, deadline: Time, settle: Settle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            id,
            settle,
        });
        self.pending.insert(id);
    }

    /// Cancels a pending timer. Returns false if the id is unknown or
    /// already fired.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        if self.pending.remove(&id) {
            self.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// The earliest live deadline, if any. Discards cancelled entries
    /// that have surfaced at the top of the heap.
    pub(crate) fn peek_deadline(&mut self) -> Option<Time> {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.id) {
                self.heap.pop();
            } else {
                return Some(entry.deadline);
            }
        }
        None
    }

    /// Pops the settle handles of all live timers with deadline <= now.
    pub(crate) fn pop_expired(&mut self, now: Time) -> Vec<Settle> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if self.cancelled.remove(&entry.id) {
                    continue;
                }
                self.pending.remove(&entry.id);
                expired.push(entry.settle);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::Promise;
    use crate::value::Value;

    #[test]
    fn expires_in_deadline_then_insertion_order() {
        let mut heap = TimerHeap::default();
        let (a, sa) = Promise::pending();
        let (b, sb) = Promise::pending();
        let (c, sc) = Promise::pending();
        heap.insert(TimerId::from_raw(0), Time::from_millis(50), sa);
        heap.insert(TimerId::from_raw(1), Time::from_millis(10), sb);
        heap.insert(TimerId::from_raw(2), Time::from_millis(10), sc);

        let expired = heap.pop_expired(Time::from_millis(10));
        assert_eq!(expired.len(), 2);
        for settle in expired {
            settle.resolve(Value::Unit);
        }
        assert!(b.is_settled() && c.is_settled());
        assert!(!a.is_settled());
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut heap = TimerHeap::default();
        let (p, settle) = Promise::pending();
        let id = TimerId::from_raw(7);
        heap.insert(id, Time::from_millis(5), settle);
        assert!(heap.cancel(id));
        assert!(!heap.cancel(id));
        assert_eq!(heap.live(), 0);
        assert!(heap.pop_expired(Time::from_millis(100)).is_empty());
        assert!(!p.is_settled());
        assert_eq!(heap.peek_deadline(), None);
    }

    #[test]
    fn cancelling_a_fired_id_is_a_miss() {
        let mut heap = TimerHeap::default();
        let (_fast, sa) = Promise::pending();
        let (_slow, sb) = Promise::pending();
        let fired = TimerId::from_raw(0);
        heap.insert(fired, Time::from_millis(10), sa);
        heap.insert(TimerId::from_raw(1), Time::from_millis(500), sb);

        assert_eq!(heap.pop_expired(Time::from_millis(10)).len(), 1);
        assert!(!heap.cancel(fired));
        assert_eq!(heap.live(), 1, "the other timer keeps its count");
        assert_eq!(heap.peek_deadline(), Some(Time::from_millis(500)));
    }

    #[test]
    fn peek_skips_cancelled_heads() {
        let mut heap = TimerHeap::default();
        let (_a, sa) = Promise::pending();
        let (_b, sb) = Promise::pending();
        heap.insert(TimerId::from_raw(0), Time::from_millis(1), sa);
        heap.insert(TimerId::from_raw(1), Time::from_millis(9), sb);
        heap.cancel(TimerId::from_raw(0));
        assert_eq!(heap.peek_deadline(), Some(Time::from_millis(9)));
    }
}

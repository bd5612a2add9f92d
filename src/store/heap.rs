/// Binary-heap event store.
///
/// Uses a `BinaryHeap` with reversed `Ord` on [`HeapEntry`] to act as a
/// min-heap keyed by `(at, seq)`. Because sequence numbers are strictly
/// increasing, events due at the same instant pop in submission order,
/// exactly like [`BucketStore`](super::BucketStore).
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::error::StoreError;
use crate::event::EventId;
use crate::time::SimTime;

use super::EventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    at: SimTime,
    seq: u64,
    id: EventId,
}

/// Ordering: smallest `(at, seq)` first.
///
/// `BinaryHeap` is a *max*-heap, so the natural ordering is reversed.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct HeapStore {
    heap: BinaryHeap<HeapEntry>,
    /// Monotonic tie-breaker.
    next_seq: u64,
    now: SimTime,
    removed: HashSet<EventId>,
    len: usize,
}

impl HeapStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, id: EventId, at: SimTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry { at, seq, id });
        self.len += 1;
    }

    fn purge_top(&mut self) {
        while let Some(top) = self.heap.peek() {
            if !self.removed.remove(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl EventStore for HeapStore {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn cursor(&self) -> SimTime {
        self.now
    }

    fn insert_now(&mut self, id: EventId) {
        self.push(id, self.now);
    }

    fn insert_at(&mut self, id: EventId, at: SimTime) -> Result<(), StoreError> {
        if at < self.now {
            return Err(StoreError::PastTime {
                requested: at,
                cursor: self.now,
            });
        }
        self.push(id, at);
        Ok(())
    }

    fn peek_next(&mut self) -> Option<(SimTime, EventId)> {
        self.purge_top();
        self.heap.peek().map(|e| (e.at, e.id))
    }

    fn pop_next(&mut self) -> Option<(SimTime, EventId)> {
        self.purge_top();
        let entry = self.heap.pop()?;
        debug_assert!(entry.at >= self.now, "heap store went backward");
        self.now = entry.at;
        self.len -= 1;
        Some((entry.at, entry.id))
    }

    fn remove(&mut self, id: EventId, at: SimTime) -> bool {
        if at < self.now || !self.removed.insert(id) {
            return false;
        }
        self.len -= 1;
        true
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.heap.clear();
        self.removed.clear();
        self.next_seq = 0;
        self.now = SimTime::ZERO;
        self.len = 0;
    }
}

/// Bucketed event store: one FIFO queue per pending instant.
///
/// The bucket at the cursor is kept outside the ordered map so that the hot
/// path, scheduling at the current instant, is a plain `push_back` with no
/// key lookup. Later instants live in a `BTreeMap` keyed by time.
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::error::StoreError;
use crate::event::EventId;
use crate::time::SimTime;

use super::{purge_front, EventStore};

#[derive(Debug, Default)]
pub struct BucketStore {
    /// Instant of the cursor bucket. Always exists, possibly empty.
    now: SimTime,
    /// Events due at `now`.
    current: VecDeque<EventId>,
    /// Buckets strictly after `now`.
    future: BTreeMap<SimTime, VecDeque<EventId>>,
    /// Ids removed but still physically present in some bucket.
    removed: HashSet<EventId>,
    len: usize,
}

impl BucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets currently allocated, the cursor bucket included.
    ///
    /// Emptied buckets are only reclaimed when the cursor walks past them.
    pub fn bucket_count(&self) -> usize {
        1 + self.future.len()
    }
}

impl EventStore for BucketStore {
    fn name(&self) -> &'static str {
        "bucket"
    }

    fn cursor(&self) -> SimTime {
        self.now
    }

    fn insert_now(&mut self, id: EventId) {
        self.current.push_back(id);
        self.len += 1;
    }

    fn insert_at(&mut self, id: EventId, at: SimTime) -> Result<(), StoreError> {
        if at < self.now {
            return Err(StoreError::PastTime {
                requested: at,
                cursor: self.now,
            });
        }
        if at == self.now {
            self.current.push_back(id);
        } else {
            self.future.entry(at).or_default().push_back(id);
        }
        self.len += 1;
        Ok(())
    }

    fn peek_next(&mut self) -> Option<(SimTime, EventId)> {
        purge_front(&mut self.current, &mut self.removed);
        if let Some(&id) = self.current.front() {
            return Some((self.now, id));
        }
        loop {
            let mut entry = self.future.first_entry()?;
            purge_front(entry.get_mut(), &mut self.removed);
            if let Some(&id) = entry.get().front() {
                return Some((*entry.key(), id));
            }
            // Only tombstones were left in this bucket.
            entry.remove();
        }
    }

    fn pop_next(&mut self) -> Option<(SimTime, EventId)> {
        let (at, _) = self.peek_next()?;
        if at != self.now {
            // The cursor bucket is drained: destroy it and move on.
            let (next, bucket) = self.future.pop_first()?;
            debug_assert_eq!(next, at);
            tracing::trace!(from = %self.now, to = %next, "cursor advanced");
            self.now = next;
            self.current = bucket;
        }
        let id = self.current.pop_front()?;
        self.len -= 1;
        Some((at, id))
    }

    fn remove(&mut self, id: EventId, at: SimTime) -> bool {
        let present = at == self.now || self.future.contains_key(&at);
        if present && self.removed.insert(id) {
            self.len -= 1;
            return true;
        }
        false
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.now = SimTime::ZERO;
        self.current.clear();
        self.future.clear();
        self.removed.clear();
        self.len = 0;
    }
}

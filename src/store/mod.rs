//! Time-ordered event stores.
//!
//! The scheduler talks to its store only through [`EventStore`], so the
//! ordering structure can be swapped without touching the engine.
//!
//! | Store | Insert "now" | Insert at `t` | Pop |
//! |---|---|---|---|
//! | [`BucketStore`] | O(1) | O(log B) | O(1) amortized |
//! | [`HeapStore`] | O(log N) | O(log N) | O(log N) |
//!
//! (`B` = number of distinct pending instants, `N` = pending events.)
//!
//! Both stores hand out events strictly by time and, within one instant, in
//! submission order. Stores hold [`EventId`]s only; removal records a
//! tombstone that is skipped and dropped when it reaches the front.

pub mod bucket;
pub mod heap;

pub use bucket::BucketStore;
pub use heap::HeapStore;

use std::collections::{HashSet, VecDeque};

use crate::error::StoreError;
use crate::event::EventId;
use crate::time::SimTime;

/// A mapping from simulated instants to FIFO queues of due events.
///
/// # Contract
///
/// Implementations **must**:
/// - Return events in non-decreasing time order.
/// - Preserve submission order among events due at the same instant.
/// - Reject insertion before [`cursor`](EventStore::cursor).
/// - Only move the cursor forward, and only inside `pop_next`.
pub trait EventStore: std::fmt::Debug {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// The instant of the most recently popped event (the origin initially).
    fn cursor(&self) -> SimTime;

    /// Append an event due at the cursor instant.
    fn insert_now(&mut self, id: EventId);

    /// Append an event due at `at`, which must not precede the cursor.
    fn insert_at(&mut self, id: EventId, at: SimTime) -> Result<(), StoreError>;

    /// The next event to run and its due time, without removing it.
    ///
    /// Discards emptied buckets and tombstones on the way; returns `None`
    /// once the store is exhausted.
    fn peek_next(&mut self) -> Option<(SimTime, EventId)>;

    /// Remove and return the next event, advancing the cursor to its time.
    fn pop_next(&mut self) -> Option<(SimTime, EventId)>;

    /// Forget the event `id` queued at `at`.
    ///
    /// The caller guarantees the event is currently queued here. Emptied
    /// buckets stay in place until `peek_next`/`pop_next` walk past them.
    /// Returns `false` if `at` names no pending instant.
    fn remove(&mut self, id: EventId, at: SimTime) -> bool;

    /// Number of queued (not removed) events.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything and rewind the cursor to the origin.
    fn clear(&mut self);
}

/// Pop tombstoned ids off the front of `bucket`.
pub(crate) fn purge_front(bucket: &mut VecDeque<EventId>, removed: &mut HashSet<EventId>) {
    while let Some(front) = bucket.front() {
        if !removed.remove(front) {
            break;
        }
        bucket.pop_front();
    }
}

/// Events: the unit of scheduled work.
///
/// An event couples a callable with the simulated time it is due at and an
/// explicit lifecycle state. The scheduler owns the callable while the event
/// is queued; callers keep an [`EventHandle`] to query the state or cancel.
use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, CancelError};
use crate::scheduler::Scheduler;
use crate::time::SimTime;

// ── Callable ──────────────────────────────────────────────────────────

/// What a callable returns. Failures are handed back to whoever drove the
/// scheduler, untouched.
pub type CallableResult = Result<(), BoxError>;

/// A unit of deferred work.
///
/// The scheduler passes itself in, so a callable can schedule follow-up
/// work, cancel other events or request a stop without any global state.
pub type Callable = Box<dyn FnOnce(&mut Scheduler) -> CallableResult + 'static>;

// ── Event ID ──────────────────────────────────────────────────────────

/// Generation-checked key of an event slot in the scheduler's arena.
///
/// Slots are recycled once an event leaves the store; the generation makes
/// a stale key distinguishable from the key of the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EventId {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        EventId { index, generation }
    }

    /// Slot index in the arena.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}.{}", self.index, self.generation)
    }
}

// ── Event State ───────────────────────────────────────────────────────

/// Lifecycle of an event.
///
/// `NotSubmitted → Queued → Running → Finished`, or `Queued → Canceled`.
/// No other transition is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    NotSubmitted,
    Queued,
    Running,
    Finished,
    Canceled,
}

impl EventState {
    /// Whether `self → next` respects the monotonic lifecycle.
    pub fn can_transition_to(self, next: EventState) -> bool {
        matches!(
            (self, next),
            (EventState::NotSubmitted, EventState::Queued)
                | (EventState::Queued, EventState::Running)
                | (EventState::Queued, EventState::Canceled)
                | (EventState::Running, EventState::Finished)
        )
    }

    /// The error a cancellation attempt reports for this state, or `None`
    /// if the event may be cancelled.
    pub fn cancel_error(self) -> Option<CancelError> {
        match self {
            EventState::Queued => None,
            EventState::Running => Some(CancelError::AlreadyRunning),
            EventState::Canceled => Some(CancelError::AlreadyCanceled),
            EventState::Finished => Some(CancelError::AlreadyFinished),
            EventState::NotSubmitted => Some(CancelError::NotSubmitted),
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventState::NotSubmitted => "not-submitted",
            EventState::Queued => "queued",
            EventState::Running => "running",
            EventState::Finished => "finished",
            EventState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

// ── Event record ──────────────────────────────────────────────────────

/// The part of an event shared between the scheduler and its handles.
#[derive(Debug)]
pub(crate) struct EventRecord {
    pub(crate) id: EventId,
    pub(crate) scheduled: SimTime,
    pub(crate) issued: SimTime,
    state: Cell<EventState>,
}

impl EventRecord {
    pub(crate) fn new(id: EventId, scheduled: SimTime, issued: SimTime) -> Self {
        EventRecord {
            id,
            scheduled,
            issued,
            state: Cell::new(EventState::NotSubmitted),
        }
    }

    pub(crate) fn state(&self) -> EventState {
        self.state.get()
    }

    /// Move to `next`. Only the owning scheduler calls this.
    pub(crate) fn transition(&self, next: EventState) {
        debug_assert!(
            self.state.get().can_transition_to(next),
            "illegal event transition {} -> {}",
            self.state.get(),
            next
        );
        self.state.set(next);
    }
}

/// A queued event as held by the scheduler's arena.
pub(crate) struct QueuedEvent {
    pub(crate) record: Rc<EventRecord>,
    pub(crate) callable: Callable,
}

impl std::fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

// ── Event Handle ──────────────────────────────────────────────────────

/// Caller-side reference to a submitted event.
///
/// Cheap to clone. Holding a handle never keeps the callable alive: once the
/// event ran or was cancelled the scheduler has dropped it, and the handle
/// only reports the final state.
#[derive(Debug, Clone)]
pub struct EventHandle {
    pub(crate) record: Rc<EventRecord>,
}

impl EventHandle {
    pub(crate) fn new(record: Rc<EventRecord>) -> Self {
        EventHandle { record }
    }

    pub fn id(&self) -> EventId {
        self.record.id
    }

    /// Simulated time the event is due at.
    pub fn scheduled(&self) -> SimTime {
        self.record.scheduled
    }

    /// Simulated time at which the event was submitted.
    pub fn issued(&self) -> SimTime {
        self.record.issued
    }

    pub fn state(&self) -> EventState {
        self.record.state()
    }

    pub fn is_not_submitted(&self) -> bool {
        self.state() == EventState::NotSubmitted
    }

    pub fn is_queued(&self) -> bool {
        self.state() == EventState::Queued
    }

    pub fn is_running(&self) -> bool {
        self.state() == EventState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == EventState::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == EventState::Canceled
    }

    /// Cancel this event. Equivalent to `scheduler.cancel_event(self)`.
    pub fn cancel(&self, scheduler: &mut Scheduler) -> Result<(), CancelError> {
        scheduler.cancel_event(self)
    }

    /// Whether both handles refer to the same submitted event.
    pub fn ptr_eq(&self, other: &EventHandle) -> bool {
        Rc::ptr_eq(&self.record, &other.record)
    }
}

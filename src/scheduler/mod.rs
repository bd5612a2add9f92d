/// The scheduling engine.
///
/// Owns the event store, the arena of queued events, the command queue and
/// the attached observers. One call to [`Scheduler::process_one_event`]
/// drains pending commands, then runs at most one event. The loop is
/// single-threaded; given equal inputs, runs are bit-for-bit reproducible.
use std::rc::Rc;
use std::time::Duration;

use crate::arena::Arena;
use crate::command::{self, CommandHandle, CommandQueue, CommandSender};
use crate::config::SchedulerConfig;
use crate::error::{CancelError, SchedulerError, SchedulerResult};
use crate::event::{
    Callable, CallableResult, EventHandle, EventId, EventRecord, EventState, QueuedEvent,
};
use crate::observer::{ObserverFailure, ObserverId, ObserverSet, SchedulerObserver};
use crate::store::{BucketStore, EventStore};
use crate::time::SimTime;


// ── Run state ─────────────────────────────────────────────────────────

/// Coarse engine state, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Not inside [`Scheduler::start`].
    #[default]
    Idle,
    /// Inside [`Scheduler::start`].
    Running,
    /// A stop request took effect at an instant boundary.
    Stopped,
}

// ── Scheduler ─────────────────────────────────────────────────────────

/// Discrete-event scheduler.
///
/// Events are closures that receive the scheduler itself, so follow-up work
/// is scheduled through the same `&mut Scheduler` the event was handed.
///
/// ```rust
/// use eventcore::{Scheduler, SimTime};
///
/// let mut sched = Scheduler::new();
/// sched
///     .schedule_at(|s| { s.schedule_now(|_| Ok(())); Ok(()) }, SimTime::from_secs(10))
///     .unwrap();
/// assert_eq!(sched.start().unwrap(), 2);
/// assert_eq!(sched.time(), SimTime::from_secs(10));
/// ```
pub struct Scheduler {
    store: Box<dyn EventStore>,
    events: Arena<QueuedEvent>,
    now: SimTime,
    state: RunState,
    stop_requested: bool,
    /// Set for the duration of `process_one_event`.
    processing: bool,
    commands: CommandQueue,
    observers: ObserverSet,
    events_processed: u64,
}

impl Scheduler {
    /// A scheduler backed by a [`BucketStore`], starting at the origin.
    pub fn new() -> Self {
        Self::with_store(BucketStore::new())
    }

    /// A scheduler backed by an arbitrary store.
    pub fn with_store(store: impl EventStore + 'static) -> Self {
        Self::assemble(Box::new(store), &SchedulerConfig::default())
    }

    /// A [`BucketStore`] scheduler sized and limited by `config`.
    ///
    /// If `config.stop_at` is set, a stop request is scheduled at that time.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::from_config_with_store(config, BucketStore::new())
    }

    pub fn from_config_with_store(
        config: &SchedulerConfig,
        store: impl EventStore + 'static,
    ) -> Self {
        let mut scheduler = Self::assemble(Box::new(store), config);
        if let Some(at) = config.stop_time() {
            // The store is empty and the cursor sits at the origin, so any
            // time is acceptable here.
            if let Err(e) = scheduler.schedule_at(
                |s| {
                    s.stop();
                    Ok(())
                },
                at,
            ) {
                tracing::warn!(error = %e, "could not schedule configured stop");
            }
        }
        scheduler
    }

    fn assemble(store: Box<dyn EventStore>, config: &SchedulerConfig) -> Self {
        tracing::debug!(
            store = store.name(),
            capacity = config.event_capacity,
            "scheduler created"
        );
        Scheduler {
            store,
            events: Arena::with_capacity(config.event_capacity),
            now: SimTime::ZERO,
            state: RunState::Idle,
            stop_requested: false,
            processing: false,
            commands: CommandQueue::with_batch_limit(config.command_batch_limit),
            observers: ObserverSet::default(),
            events_processed: 0,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Current simulated time: the due time of the last executed event.
    #[inline]
    pub fn time(&self) -> SimTime {
        self.now
    }

    /// Number of queued events.
    #[inline]
    pub fn size(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Events executed since creation or the last [`reset`](Self::reset).
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Name of the backing store, for diagnostics.
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    // ── Scheduling ────────────────────────────────────────────────────

    /// Queue `callable` at the current instant, behind everything already
    /// due now.
    pub fn schedule_now<F>(&mut self, callable: F) -> EventHandle
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        let (id, handle) = self.create(self.now, Box::new(callable));
        self.observers
            .notify("on_schedule_now", |o| o.on_schedule_now(&handle));
        self.store.insert_now(id);
        self.enqueued(&handle, "now");
        handle
    }

    /// Queue `callable` at `at`.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidTime`] if `at` precedes the current time.
    pub fn schedule_at<F>(&mut self, callable: F, at: SimTime) -> SchedulerResult<EventHandle>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        if at < self.now {
            return Err(SchedulerError::InvalidTime {
                requested: at,
                current: self.now,
            });
        }
        let (id, handle) = self.create(at, Box::new(callable));
        self.observers.notify("on_schedule", |o| o.on_schedule(&handle));
        self.insert_at(id, at)?;
        self.enqueued(&handle, "at");
        Ok(handle)
    }

    /// Queue `callable` at `time() + delay`.
    ///
    /// # Errors
    /// [`SchedulerError::TimeOverflow`] if the sum does not fit.
    pub fn schedule_delay<F>(
        &mut self,
        callable: F,
        delay: Duration,
    ) -> SchedulerResult<EventHandle>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        let at = self
            .now
            .checked_add(delay)
            .ok_or(SchedulerError::TimeOverflow)?;
        let (id, handle) = self.create(at, Box::new(callable));
        self.observers
            .notify("on_schedule_delay", |o| o.on_schedule_delay(&handle, delay));
        self.insert_at(id, at)?;
        self.enqueued(&handle, "delay");
        Ok(handle)
    }

    /// Cancel a queued event.
    ///
    /// # Errors
    /// One [`CancelError`] variant per state the event may be in instead of
    /// `Queued`; `NotSubmitted` also covers handles from another scheduler.
    /// A failed attempt changes nothing.
    pub fn cancel_event(&mut self, handle: &EventHandle) -> Result<(), CancelError> {
        let record = &handle.record;
        if let Some(err) = record.state().cancel_error() {
            return Err(err);
        }
        match self.events.get(record.id) {
            Some(queued) if Rc::ptr_eq(&queued.record, record) => {}
            _ => return Err(CancelError::NotSubmitted),
        }
        let removed = self.store.remove(record.id, record.scheduled);
        debug_assert!(removed, "queued event {} missing from store", record.id);
        // Dropping the entry drops the callable.
        self.events.remove(record.id);
        record.transition(EventState::Canceled);
        tracing::trace!(event = %record.id, at = %record.scheduled, "event canceled");
        self.observers
            .notify("on_cancel_event", |o| o.on_cancel_event(handle));
        Ok(())
    }

    fn create(&mut self, at: SimTime, callable: Callable) -> (EventId, EventHandle) {
        let id = self.events.next_id();
        let record = Rc::new(EventRecord::new(id, at, self.now));
        let inserted = self.events.insert_with(|_| QueuedEvent {
            record: Rc::clone(&record),
            callable,
        });
        debug_assert_eq!(id, inserted);
        (id, EventHandle::new(record))
    }

    fn insert_at(&mut self, id: EventId, at: SimTime) -> SchedulerResult<()> {
        if let Err(e) = self.store.insert_at(id, at) {
            self.events.remove(id);
            return Err(e.into());
        }
        Ok(())
    }

    fn enqueued(&mut self, handle: &EventHandle, via: &'static str) {
        handle.record.transition(EventState::Queued);
        tracing::trace!(event = %handle.id(), at = %handle.scheduled(), via, "event queued");
        self.observers.notify("on_add_event", |o| o.on_add_event(handle));
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// Drain pending commands, then run the next due event, if any.
    ///
    /// Returns `Ok(false)` when the store is exhausted, or when the next
    /// event lies in a later instant and a stop was requested. Commands are
    /// drained in both cases.
    ///
    /// # Errors
    /// - [`SchedulerError::Reentrant`] if called from inside an event.
    /// - [`SchedulerError::Command`] if a drained command failed.
    /// - [`SchedulerError::Callable`] if the event failed. The event is
    ///   still `Finished` and gone from the store.
    pub fn process_one_event(&mut self) -> SchedulerResult<bool> {
        if self.processing {
            return Err(SchedulerError::Reentrant {
                operation: "process_one_event",
            });
        }
        Processing::enter(self).step()
    }

    fn step(&mut self) -> SchedulerResult<bool> {
        self.drain_commands()?;

        let Some((at, _)) = self.store.peek_next() else {
            return Ok(false);
        };
        if at > self.now {
            if self.stop_requested {
                if self.state != RunState::Stopped {
                    tracing::debug!(now = %self.now, next = %at, "stop took effect");
                }
                self.state = RunState::Stopped;
                return Ok(false);
            }
            tracing::trace!(from = %self.now, to = %at, "advancing simulated time");
            self.now = at;
            self.observers
                .notify("on_new_sim_time", |o| o.on_new_sim_time(at));
        }

        let Some((at, id)) = self.store.pop_next() else {
            return Ok(false);
        };
        debug_assert_eq!(at, self.now);
        let Some(QueuedEvent { record, callable }) = self.events.remove(id) else {
            tracing::error!(event = %id, "store yielded an event the arena does not hold");
            return Ok(true);
        };

        record.transition(EventState::Running);
        tracing::trace!(event = %id, at = %at, "dispatching event");
        let outcome = callable(self);
        record.transition(EventState::Finished);
        self.events_processed += 1;

        match outcome {
            Ok(()) => {
                let handle = EventHandle::new(record);
                self.observers
                    .notify("on_process_one_event", |o| o.on_process_one_event(&handle));
                Ok(true)
            }
            Err(source) => {
                tracing::debug!(event = %id, at = %at, error = %source, "event failed");
                Err(SchedulerError::Callable { at, source })
            }
        }
    }

    fn drain_commands(&mut self) -> SchedulerResult<()> {
        let batch = self.commands.begin_drain();
        for _ in 0..batch {
            let Some(ready) = self.commands.next_ready() else {
                break;
            };
            tracing::trace!(command = ready.id(), "running command");
            let (shared, run) = ready.start();
            let outcome = run(self);
            command::finish(&shared);
            outcome.map_err(|source| SchedulerError::Command { source })?;
        }
        Ok(())
    }

    /// Process events until the store is exhausted or a stop takes effect.
    ///
    /// Returns the number of events executed by this call.
    pub fn start(&mut self) -> SchedulerResult<u64> {
        self.run_for(u64::MAX)
    }

    /// Like [`start`](Self::start), but returns after at most `max_events`
    /// events.
    pub fn run_for(&mut self, max_events: u64) -> SchedulerResult<u64> {
        if self.processing {
            return Err(SchedulerError::Reentrant { operation: "start" });
        }
        let before = self.events_processed;
        self.state = RunState::Running;
        tracing::debug!(now = %self.now, pending = self.size(), "scheduler started");

        let mut outcome = Ok(());
        while self.events_processed - before < max_events {
            match self.process_one_event() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if self.state == RunState::Running {
            self.state = RunState::Idle;
        }
        let processed = self.events_processed - before;
        tracing::debug!(now = %self.now, processed, "scheduler returned");
        outcome.map(|()| processed)
    }

    /// Request a stop at the next instant boundary.
    ///
    /// Events already due at the current instant still run. The request
    /// stays in force until [`reset`](Self::reset).
    pub fn stop(&mut self) {
        if !self.stop_requested {
            tracing::debug!(now = %self.now, "stop requested");
        }
        self.stop_requested = true;
    }

    /// Cancel everything and rewind to the origin.
    ///
    /// Queued events and commands end up `Canceled`. Observers stay attached.
    ///
    /// # Errors
    /// [`SchedulerError::Reentrant`] if called from inside an event or command.
    pub fn reset(&mut self) -> SchedulerResult<()> {
        if self.processing {
            return Err(SchedulerError::Reentrant { operation: "reset" });
        }
        let dropped = self.events.len();
        for queued in self.events.drain() {
            queued.record.transition(EventState::Canceled);
        }
        self.store.clear();
        self.commands.reset();
        self.now = SimTime::ZERO;
        self.stop_requested = false;
        self.state = RunState::Idle;
        self.events_processed = 0;
        tracing::debug!(dropped, "scheduler reset");
        Ok(())
    }

    // ── Commands ──────────────────────────────────────────────────────

    /// Queue a command to run at the start of the next step.
    pub fn queue_command<F>(&self, command: F) -> CommandHandle
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + Send + 'static,
    {
        self.commands.queue_command(command)
    }

    /// Withdraw a command that has not started yet.
    ///
    /// # Errors
    /// [`SchedulerError::UnknownCommand`] if it already ran or was withdrawn.
    pub fn dequeue_command(&self, handle: &CommandHandle) -> SchedulerResult<()> {
        self.commands.dequeue_command(handle)
    }

    /// A sender other threads can use to queue commands.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Commands waiting to be drained.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    // ── Observers ─────────────────────────────────────────────────────

    pub fn add_observer(&mut self, observer: Box<dyn SchedulerObserver>) -> ObserverId {
        let id = self.observers.add(observer);
        tracing::debug!(observer = %id, "observer attached");
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn SchedulerObserver>> {
        let removed = self.observers.remove(id);
        if removed.is_some() {
            tracing::debug!(observer = %id, "observer detached");
        }
        removed
    }

    /// Downcast an attached observer for inspection.
    ///
    /// Returns `None` if `id` is not attached or has a different type.
    pub fn observer<T: SchedulerObserver + 'static>(&self, id: ObserverId) -> Option<&T> {
        self.observers.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn observer_mut<T: SchedulerObserver + 'static>(
        &mut self,
        id: ObserverId,
    ) -> Option<&mut T> {
        self.observers.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Failures raised by observer hooks since the last call, oldest first.
    pub fn take_observer_failures(&mut self) -> Vec<ObserverFailure> {
        self.observers.take_failures()
    }
}

/// Holds the `processing` flag for one step and clears it on drop, unwinding
/// included.
struct Processing<'a>(&'a mut Scheduler);

impl<'a> Processing<'a> {
    fn enter(scheduler: &'a mut Scheduler) -> Self {
        scheduler.processing = true;
        Processing(scheduler)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.processing = false;
    }
}

impl std::ops::Deref for Processing<'_> {
    type Target = Scheduler;

    fn deref(&self) -> &Scheduler {
        self.0
    }
}

impl std::ops::DerefMut for Processing<'_> {
    fn deref_mut(&mut self) -> &mut Scheduler {
        self.0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("store", &self.store)
            .field("now", &self.now)
            .field("state", &self.state)
            .field("stop_requested", &self.stop_requested)
            .field("queued", &self.events.len())
            .field("commands", &self.commands)
            .field("observers", &self.observers)
            .field("events_processed", &self.events_processed)
            .finish()
    }
}

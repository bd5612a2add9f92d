//! Timeout helpers for protocol code.
//!
//! Thin wrappers over [`Scheduler::schedule_delay`] and
//! [`Scheduler::cancel_event`] that remember the pending event, so a
//! component can arm, re-arm and cancel its timers without tracking handles
//! itself. Each helper is a cheap, clonable reference to shared state; the
//! scheduled callback holds one clone and disarms it before firing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{SchedulerError, TimerError};
use crate::event::{CallableResult, EventHandle};
use crate::scheduler::Scheduler;
use crate::time::SimTime;

fn is_armed(pending: Option<&EventHandle>) -> bool {
    pending.is_some_and(EventHandle::is_queued)
}

fn cancel_pending(
    scheduler: &mut Scheduler,
    pending: Option<EventHandle>,
) -> Result<(), TimerError> {
    match pending {
        Some(handle) if handle.is_queued() => {
            scheduler
                .cancel_event(&handle)
                .map_err(SchedulerError::from)?;
            Ok(())
        }
        _ => Err(TimerError::NotSet),
    }
}

// ── Timeout ───────────────────────────────────────────────────────────

/// A single one-shot timer.
#[derive(Debug, Clone, Default)]
pub struct Timeout {
    pending: Rc<RefCell<Option<EventHandle>>>,
}

impl Timeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to run `on_timeout` after `delay`.
    ///
    /// # Errors
    /// [`TimerError::AlreadySet`] if the timer is armed.
    pub fn set_timeout<F>(
        &self,
        scheduler: &mut Scheduler,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        if self.has_timeout_set() {
            return Err(TimerError::AlreadySet);
        }
        self.arm(scheduler, delay, on_timeout)
    }

    /// Arm the timer, cancelling the pending timeout if there is one.
    pub fn set_new_timeout<F>(
        &self,
        scheduler: &mut Scheduler,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        if self.has_timeout_set() {
            self.cancel_timeout(scheduler)?;
        }
        self.arm(scheduler, delay, on_timeout)
    }

    pub fn has_timeout_set(&self) -> bool {
        is_armed(self.pending.borrow().as_ref())
    }

    /// Disarm the timer.
    ///
    /// # Errors
    /// [`TimerError::NotSet`] if the timer is not armed.
    pub fn cancel_timeout(&self, scheduler: &mut Scheduler) -> Result<(), TimerError> {
        let pending = self.pending.borrow_mut().take();
        cancel_pending(scheduler, pending)
    }

    /// Simulated time the armed timeout fires at.
    pub fn expires_at(&self) -> Option<SimTime> {
        self.pending
            .borrow()
            .as_ref()
            .filter(|h| h.is_queued())
            .map(EventHandle::scheduled)
    }

    fn arm<F>(
        &self,
        scheduler: &mut Scheduler,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        let slot = Rc::clone(&self.pending);
        let handle = scheduler.schedule_delay(
            move |s| {
                slot.borrow_mut().take();
                on_timeout(s)
            },
            delay,
        )?;
        *self.pending.borrow_mut() = Some(handle);
        Ok(())
    }
}

// ── MultipleTimeout ───────────────────────────────────────────────────

/// One independent timer per key.
#[derive(Debug, Clone)]
pub struct MultipleTimeout<K> {
    pending: Rc<RefCell<BTreeMap<K, EventHandle>>>,
}

impl<K: Ord + Clone + 'static> MultipleTimeout<K> {
    pub fn new() -> Self {
        MultipleTimeout {
            pending: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Arm the timer for `key`.
    ///
    /// # Errors
    /// [`TimerError::AlreadySet`] if that key's timer is armed.
    pub fn set_timeout<F>(
        &self,
        scheduler: &mut Scheduler,
        key: K,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        if self.has_timeout_set(&key) {
            return Err(TimerError::AlreadySet);
        }
        self.arm(scheduler, key, delay, on_timeout)
    }

    /// Arm the timer for `key`, replacing a pending one.
    pub fn set_new_timeout<F>(
        &self,
        scheduler: &mut Scheduler,
        key: K,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        if self.has_timeout_set(&key) {
            self.cancel_timeout(scheduler, &key)?;
        }
        self.arm(scheduler, key, delay, on_timeout)
    }

    pub fn has_timeout_set(&self, key: &K) -> bool {
        is_armed(self.pending.borrow().get(key))
    }

    /// # Errors
    /// [`TimerError::NotSet`] if that key's timer is not armed.
    pub fn cancel_timeout(&self, scheduler: &mut Scheduler, key: &K) -> Result<(), TimerError> {
        let pending = self.pending.borrow_mut().remove(key);
        cancel_pending(scheduler, pending)
    }

    pub fn number_of_timeouts_set(&self) -> usize {
        self.pending
            .borrow()
            .values()
            .filter(|h| h.is_queued())
            .count()
    }

    /// Disarm every timer. Keys without an armed timer are skipped.
    pub fn cancel_all_timeouts(&self, scheduler: &mut Scheduler) -> Result<(), TimerError> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for handle in pending.into_values().filter(EventHandle::is_queued) {
            scheduler
                .cancel_event(&handle)
                .map_err(SchedulerError::from)?;
        }
        Ok(())
    }

    fn arm<F>(
        &self,
        scheduler: &mut Scheduler,
        key: K,
        delay: Duration,
        on_timeout: F,
    ) -> Result<(), TimerError>
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + 'static,
    {
        let slot = Rc::clone(&self.pending);
        let fired = key.clone();
        let handle = scheduler.schedule_delay(
            move |s| {
                slot.borrow_mut().remove(&fired);
                on_timeout(s)
            },
            delay,
        )?;
        self.pending.borrow_mut().insert(key, handle);
        Ok(())
    }
}

impl<K: Ord + Clone + 'static> Default for MultipleTimeout<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ── PeriodicTimeout ───────────────────────────────────────────────────

type Tick = Box<dyn FnMut(&mut Scheduler) -> CallableResult>;

#[derive(Default)]
struct Periodic {
    pending: Option<EventHandle>,
    period: Duration,
    on_tick: Option<Tick>,
}

/// A timer that fires every `period` until cancelled.
///
/// The next firing is queued before the callback runs, so the callback may
/// cancel or restart the timer.
#[derive(Clone, Default)]
pub struct PeriodicTimeout {
    inner: Rc<RefCell<Periodic>>,
}

impl PeriodicTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `on_tick` after `delay`, then every `period`. A running timer
    /// is restarted.
    ///
    /// # Errors
    /// [`TimerError::ZeroPeriod`] if `period` is zero.
    pub fn start_periodic_timeout<F>(
        &self,
        scheduler: &mut Scheduler,
        period: Duration,
        delay: Duration,
        on_tick: F,
    ) -> Result<(), TimerError>
    where
        F: FnMut(&mut Scheduler) -> CallableResult + 'static,
    {
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }
        if self.has_periodic_timeout_set() {
            self.cancel_periodic_timeout(scheduler)?;
        }
        let next = Rc::clone(&self.inner);
        let handle = scheduler.schedule_delay(move |s| tick(next, s), delay)?;
        let mut inner = self.inner.borrow_mut();
        inner.period = period;
        inner.on_tick = Some(Box::new(on_tick));
        inner.pending = Some(handle);
        Ok(())
    }

    /// # Errors
    /// [`TimerError::NotSet`] if the timer is not running.
    pub fn cancel_periodic_timeout(&self, scheduler: &mut Scheduler) -> Result<(), TimerError> {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            inner.on_tick = None;
            inner.pending.take()
        };
        cancel_pending(scheduler, pending)
    }

    pub fn has_periodic_timeout_set(&self) -> bool {
        is_armed(self.inner.borrow().pending.as_ref())
    }

    /// The period of the running timer.
    pub fn period(&self) -> Option<Duration> {
        self.has_periodic_timeout_set()
            .then(|| self.inner.borrow().period)
    }
}

fn tick(inner: Rc<RefCell<Periodic>>, scheduler: &mut Scheduler) -> CallableResult {
    let period = inner.borrow().period;
    let next = Rc::clone(&inner);
    let handle = scheduler.schedule_delay(move |s| tick(next, s), period)?;

    let mut on_tick = {
        let mut state = inner.borrow_mut();
        state.pending = Some(handle);
        state.on_tick.take()
    };
    let outcome = match on_tick.as_mut() {
        Some(f) => f(scheduler),
        None => Ok(()),
    };

    let mut state = inner.borrow_mut();
    // Keep the callback unless it cancelled the timer or installed a new one.
    if state.on_tick.is_none() && is_armed(state.pending.as_ref()) {
        state.on_tick = on_tick;
    }
    outcome
}

impl std::fmt::Debug for PeriodicTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("PeriodicTimeout")
            .field("pending", &inner.pending)
            .field("period", &inner.period)
            .finish_non_exhaustive()
    }
}

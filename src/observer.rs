//! Lifecycle notifications.
//!
//! Observers are owned by the scheduler and called synchronously, in
//! operation order, from the thread running the simulation. A failing hook
//! never undoes the operation that triggered it: the failure is logged and
//! kept until [`Scheduler::take_observer_failures`] collects it.
//!
//! [`Scheduler::take_observer_failures`]: crate::scheduler::Scheduler::take_observer_failures

use std::time::Duration;

use crate::error::BoxError;
use crate::event::EventHandle;
use crate::time::SimTime;

/// Result of a single hook invocation.
pub type HookResult = Result<(), BoxError>;

// ── Observer trait ────────────────────────────────────────────────────

/// Receives scheduler lifecycle notifications.
///
/// Every hook defaults to a no-op, so implementations only override what
/// they care about.
///
/// # Example
///
/// ```rust
/// use eventcore::event::EventHandle;
/// use eventcore::observer::{HookResult, SchedulerObserver};
///
/// #[derive(Default)]
/// struct Counter { processed: u64 }
///
/// impl SchedulerObserver for Counter {
///     fn on_process_one_event(&mut self, _event: &EventHandle) -> HookResult {
///         self.processed += 1;
///         Ok(())
///     }
///     fn as_any(&self) -> &dyn std::any::Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
/// }
/// ```
pub trait SchedulerObserver {
    /// An event was submitted with `schedule_at`, before it is queued.
    fn on_schedule(&mut self, _event: &EventHandle) -> HookResult {
        Ok(())
    }

    /// An event was submitted with `schedule_now`, before it is queued.
    fn on_schedule_now(&mut self, _event: &EventHandle) -> HookResult {
        Ok(())
    }

    /// An event was submitted with `schedule_delay`, before it is queued.
    fn on_schedule_delay(&mut self, _event: &EventHandle, _delay: Duration) -> HookResult {
        Ok(())
    }

    /// An event entered the store.
    fn on_add_event(&mut self, _event: &EventHandle) -> HookResult {
        Ok(())
    }

    /// A queued event was cancelled.
    fn on_cancel_event(&mut self, _event: &EventHandle) -> HookResult {
        Ok(())
    }

    /// Simulated time is about to move to `time`.
    fn on_new_sim_time(&mut self, _time: SimTime) -> HookResult {
        Ok(())
    }

    /// An event ran to completion.
    fn on_process_one_event(&mut self, _event: &EventHandle) -> HookResult {
        Ok(())
    }

    /// Downcast support, required for `Scheduler::observer::<T>()`.
    fn as_any(&self) -> &dyn std::any::Any;
    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

// ── Identity ──────────────────────────────────────────────────────────

/// Handle returned by `add_observer`, used to remove or inspect it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "O#{}", self.0)
    }
}

/// A hook that returned an error.
#[derive(Debug, thiserror::Error)]
#[error("observer {observer} failed in {hook}")]
pub struct ObserverFailure {
    pub observer: ObserverId,
    pub hook: &'static str,
    #[source]
    pub source: BoxError,
}

// ── Observer set ──────────────────────────────────────────────────────

/// The observers attached to one scheduler, in attachment order.
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: Vec<(ObserverId, Box<dyn SchedulerObserver>)>,
    failures: Vec<ObserverFailure>,
    next_id: u64,
}

impl ObserverSet {
    pub(crate) fn add(&mut self, observer: Box<dyn SchedulerObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> Option<Box<dyn SchedulerObserver>> {
        let pos = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(pos).1)
    }

    pub(crate) fn get(&self, id: ObserverId) -> Option<&dyn SchedulerObserver> {
        self.observers
            .iter()
            .find(|(oid, _)| *oid == id)
            .map(|(_, obs)| obs.as_ref())
    }

    pub(crate) fn get_mut(
        &mut self,
        id: ObserverId,
    ) -> Option<&mut (dyn SchedulerObserver + 'static)> {
        self.observers
            .iter_mut()
            .find(|(oid, _)| *oid == id)
            .map(|(_, obs)| obs.as_mut())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    /// Invoke `hook` on every observer, retaining failures.
    pub(crate) fn notify<F>(&mut self, hook: &'static str, mut call: F)
    where
        F: FnMut(&mut dyn SchedulerObserver) -> HookResult,
    {
        for (id, observer) in self.observers.iter_mut() {
            if let Err(source) = call(observer.as_mut()) {
                tracing::warn!(observer = %id, hook, error = %source, "observer hook failed");
                self.failures.push(ObserverFailure {
                    observer: *id,
                    hook,
                    source,
                });
            }
        }
    }

    pub(crate) fn take_failures(&mut self) -> Vec<ObserverFailure> {
        std::mem::take(&mut self.failures)
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field(
                "observers",
                &self.observers.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .field("failures", &self.failures.len())
            .finish()
    }
}

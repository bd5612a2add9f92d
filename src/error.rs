//! Structured error types for the event scheduler.
//!
//! All fallible public APIs return `Result<T, E>` with one of the enums
//! below. Misuse of the engine (scheduling into the past, cancelling an
//! event twice, resetting from inside a running event) is reported
//! synchronously at the call site and never silently corrected.

use thiserror::Error;

use crate::time::SimTime;

/// Boxed failure raised by a callable, command or observer hook.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an event could not be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelError {
    /// The event is executing right now.
    #[error("event is currently being executed")]
    AlreadyRunning,

    #[error("event is already canceled")]
    AlreadyCanceled,

    #[error("event has already been executed")]
    AlreadyFinished,

    /// The handle does not refer to an event queued in this scheduler.
    #[error("event was never submitted to this scheduler")]
    NotSubmitted,
}

/// Precondition violations detected by an [`EventStore`](crate::store::EventStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cannot insert event at {requested}: store cursor is at {cursor}")]
    PastTime { requested: SimTime, cursor: SimTime },
}

/// The top-level error type of the scheduling engine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    // ── Scheduling errors ─────────────────────────────────

    /// Attempted to schedule an event before the current simulated time.
    #[error("cannot schedule event at {requested} when current time is {current}")]
    InvalidTime { requested: SimTime, current: SimTime },

    /// `now + delay` does not fit the simulated time axis.
    #[error("scheduling delay overflows simulated time")]
    TimeOverflow,

    #[error(transparent)]
    Cancel(#[from] CancelError),

    /// An engine-driving call was made from inside a running event.
    #[error("{operation} called while an event is being processed")]
    Reentrant { operation: &'static str },

    // ── Execution errors ──────────────────────────────────

    /// The callable of the event due at `at` failed.
    #[error("event at {at} failed")]
    Callable {
        at: SimTime,
        #[source]
        source: BoxError,
    },

    /// A cross-thread command failed while being drained.
    #[error("queued command failed")]
    Command {
        #[source]
        source: BoxError,
    },

    // ── Command queue errors ──────────────────────────────

    /// The command handle was already run, dequeued, or never queued here.
    #[error("command is not queued")]
    UnknownCommand,
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PastTime { requested, cursor } => SchedulerError::InvalidTime {
                requested,
                current: cursor,
            },
        }
    }
}

/// Errors raised by the timeout helpers in [`crate::timer`].
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("a timeout is already set")]
    AlreadySet,

    #[error("no timeout is set")]
    NotSet,

    /// A periodic timeout with a zero period would never leave its instant.
    #[error("periodic timeout needs a non-zero period")]
    ZeroPeriod,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Errors raised while loading a [`SchedulerConfig`](crate::config::SchedulerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// A value parsed but is out of range.
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Convenience alias for `Result<T, SchedulerError>`.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

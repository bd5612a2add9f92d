//! # eventcore: Discrete-Event Scheduling Kernel
//!
//! The engine underneath a wireless network simulator. Every protocol timer,
//! packet arrival and probe sample is an event: a closure due at a simulated
//! instant. The scheduler runs them one at a time, strictly by time and, at
//! equal times, in submission order.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │              Scheduler                │ ← drain commands, pop, run, notify
//! │  ┌──────────────┐   ┌──────────────┐  │
//! │  │  EventStore  │   │    Arena     │  │ ← ids by time / owned callables
//! │  │ bucket, heap │   │  (gen keys)  │  │
//! │  └──────────────┘   └──────────────┘  │
//! │  ┌──────────────┐   ┌──────────────┐  │
//! │  │ CommandQueue │   │  Observers   │  │ ← cross-thread ingress / hooks
//! │  └──────────────┘   └──────────────┘  │
//! │  ┌──────────────┐                     │
//! │  │   SimTime    │                     │ ← logical clock (ns)
//! │  └──────────────┘                     │
//! └───────────────────────────────────────┘
//!          ▲                      ▲
//!   EventHandle / timers    CommandSender (any thread)
//! ```
//!
//! Callables receive `&mut Scheduler`; there is no global scheduler.

pub(crate) mod arena;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod observer;
pub mod scheduler;
pub mod store;
pub mod time;
pub mod timer;

// Re-exports for convenience.
pub use command::{CommandHandle, CommandSender};
pub use config::SchedulerConfig;
pub use error::{CancelError, SchedulerError, SchedulerResult};
pub use event::{CallableResult, EventHandle, EventId, EventState};
pub use observer::{ObserverId, SchedulerObserver};
pub use scheduler::{RunState, Scheduler};
pub use store::{BucketStore, EventStore, HeapStore};
pub use time::SimTime;
pub use timer::{MultipleTimeout, PeriodicTimeout, Timeout};

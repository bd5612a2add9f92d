//! Thread-safe command ingress.
//!
//! Threads other than the simulation thread never touch scheduler state.
//! They hand a [`Command`] to a [`CommandSender`]; the scheduler drains the
//! queue at the start of every step and runs each command synchronously on
//! the simulation thread. Commands are not time-ordered: they run before
//! whatever event is due next.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{SchedulerError, SchedulerResult};
use crate::event::{CallableResult, EventState};
use crate::scheduler::Scheduler;

/// Work injected from any thread, run on the simulation thread.
pub type Command = Box<dyn FnOnce(&mut Scheduler) -> CallableResult + Send + 'static>;

// ── Shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct CommandShared {
    id: u64,
    state: AtomicU8,
    /// Id counter of the queue the command was sent to; doubles as its identity.
    origin: Arc<AtomicU64>,
}

fn encode(state: EventState) -> u8 {
    match state {
        EventState::NotSubmitted => 0,
        EventState::Queued => 1,
        EventState::Running => 2,
        EventState::Finished => 3,
        EventState::Canceled => 4,
    }
}

fn decode(raw: u8) -> EventState {
    match raw {
        0 => EventState::NotSubmitted,
        1 => EventState::Queued,
        2 => EventState::Running,
        3 => EventState::Finished,
        _ => EventState::Canceled,
    }
}

impl CommandShared {
    fn state(&self) -> EventState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Atomically move `from → to`. Returns `false` if the state was not `from`.
    fn transition(&self, from: EventState, to: EventState) -> bool {
        self.state
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ── Handle ────────────────────────────────────────────────────────────

/// Observer-side reference to a queued command. `Send + Sync`.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    shared: Arc<CommandShared>,
}

impl CommandHandle {
    /// Process-unique, strictly increasing per queue.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> EventState {
        self.shared.state()
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

    /// Cancel the command if it has not started yet.
    ///
    /// Usable from any thread. Returns `false` if the command was already
    /// running, finished or cancelled.
    pub fn cancel(&self) -> bool {
        self.shared.transition(EventState::Queued, EventState::Canceled)
    }
}

struct Envelope {
    shared: Arc<CommandShared>,
    command: Command,
}

// ── Sender ────────────────────────────────────────────────────────────

/// Cloneable, `Send + Sync` entry point for other threads.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl CommandSender {
    /// Queue `command` to run on the simulation thread at the start of the
    /// next step.
    pub fn queue_command<F>(&self, command: F) -> CommandHandle
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + Send + 'static,
    {
        let shared = Arc::new(CommandShared {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: AtomicU8::new(encode(EventState::NotSubmitted)),
            origin: Arc::clone(&self.next_id),
        });
        let handle = CommandHandle {
            shared: Arc::clone(&shared),
        };
        shared.transition(EventState::NotSubmitted, EventState::Queued);
        // The receiver lives inside the queue, which also keeps a sender;
        // a send can only fail after the scheduler was dropped.
        if self
            .tx
            .send(Envelope {
                shared,
                command: Box::new(command),
            })
            .is_err()
        {
            handle.cancel();
            tracing::warn!(command = handle.id(), "command queued after scheduler shutdown");
        }
        handle
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("pending", &self.tx.len())
            .finish()
    }
}

// ── Queue ─────────────────────────────────────────────────────────────

/// A command taken off the queue, ready to run.
pub(crate) struct ReadyCommand {
    shared: Arc<CommandShared>,
    command: Command,
}

impl ReadyCommand {
    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    /// Hand out the closure; the caller reports back via [`finish`].
    pub(crate) fn start(self) -> (Arc<CommandShared>, Command) {
        (self.shared, self.command)
    }
}

pub(crate) fn finish(shared: &CommandShared) {
    shared.transition(EventState::Running, EventState::Finished);
}

/// The scheduler-side end of the command channel.
pub struct CommandQueue {
    sender: CommandSender,
    rx: Receiver<Envelope>,
    /// Commands pulled off the channel but not run yet, in arrival order.
    backlog: VecDeque<Envelope>,
    batch_limit: Option<usize>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::with_batch_limit(None)
    }

    /// Bound the number of commands run per step. `None` runs every command
    /// pending when the drain began.
    pub fn with_batch_limit(batch_limit: Option<usize>) -> Self {
        let (tx, rx) = unbounded();
        CommandQueue {
            sender: CommandSender {
                tx,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            rx,
            backlog: VecDeque::new(),
            batch_limit,
        }
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn queue_command<F>(&self, command: F) -> CommandHandle
    where
        F: FnOnce(&mut Scheduler) -> CallableResult + Send + 'static,
    {
        self.sender.queue_command(command)
    }

    /// Remove a queued command. Fails if it already ran, was dequeued, or
    /// was queued on another queue.
    pub fn dequeue_command(&self, handle: &CommandHandle) -> SchedulerResult<()> {
        if !Arc::ptr_eq(&handle.shared.origin, &self.sender.next_id) {
            return Err(SchedulerError::UnknownCommand);
        }
        if handle.cancel() {
            Ok(())
        } else {
            Err(SchedulerError::UnknownCommand)
        }
    }

    /// Number of commands waiting in the channel or the backlog. Cancelled
    /// commands count until the next drain discards them.
    pub fn len(&self) -> usize {
        self.rx.len() + self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the channel into the backlog and return how many commands
    /// the current step may run.
    ///
    /// Commands queued after the snapshot, including those queued by the
    /// commands about to run, wait for the next step.
    pub(crate) fn begin_drain(&mut self) -> usize {
        let pending = self.rx.len();
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(envelope) => self.backlog.push_back(envelope),
                Err(_) => break,
            }
        }
        self.backlog
            .retain(|e| e.shared.state() == EventState::Queued);
        match self.batch_limit {
            Some(limit) => self.backlog.len().min(limit),
            None => self.backlog.len(),
        }
    }

    /// Claim the next backlog command that is still queued, marking it
    /// running. A concurrent `cancel` either wins before the claim or fails.
    pub(crate) fn next_ready(&mut self) -> Option<ReadyCommand> {
        while let Some(envelope) = self.backlog.pop_front() {
            if envelope
                .shared
                .transition(EventState::Queued, EventState::Running)
            {
                return Some(ReadyCommand {
                    shared: envelope.shared,
                    command: envelope.command,
                });
            }
        }
        None
    }

    /// Cancel and drop every pending command.
    pub fn reset(&mut self) {
        for envelope in self.backlog.drain(..).chain(self.rx.try_iter()) {
            envelope
                .shared
                .transition(EventState::Queued, EventState::Canceled);
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("channel", &self.rx.len())
            .field("backlog", &self.backlog.len())
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}

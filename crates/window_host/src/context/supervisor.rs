//! Supervision of context threads
//!
//! Each context thread carries an exit notice that fires when the thread
//! finishes, including when it unwinds from a panic. The supervisor collects
//! those notices and joins the matching threads, so a context that died or
//! never exited is reported instead of silently detached.

use std::fmt;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use super::ContextId;

/// Problem observed while joining a context thread
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeardownFailure {
    /// The thread unwound from a panic
    #[error("Context thread {name} ({context}) panicked: {message}")]
    Panicked {
        /// Context that failed
        context: ContextId,
        /// Thread name
        name: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// The thread was still running when the join deadline passed
    #[error("Context thread {name} ({context}) did not exit in time")]
    DidNotExit {
        /// Context that is still running
        context: ContextId,
        /// Thread name
        name: String,
    },
}

struct TrackedThread {
    context: ContextId,
    name: String,
    handle: JoinHandle<()>,
}

/// Tracks every context thread started by a factory
pub struct ContextSupervisor {
    threads: Mutex<Vec<TrackedThread>>,
    early_exits: Mutex<Vec<ContextId>>,
    exit_sender: Sender<ContextId>,
    exit_receiver: Receiver<ContextId>,
}

impl ContextSupervisor {
    /// Create a supervisor with nothing tracked
    pub fn new() -> Self {
        let (exit_sender, exit_receiver) = crossbeam_channel::unbounded();
        Self {
            threads: Mutex::new(Vec::new()),
            early_exits: Mutex::new(Vec::new()),
            exit_sender,
            exit_receiver,
        }
    }

    /// Number of threads not yet joined
    pub fn tracked(&self) -> usize {
        self.threads.lock().len()
    }

    pub(super) fn exit_notice(&self, context: ContextId) -> ExitNotice {
        ExitNotice {
            context,
            sender: self.exit_sender.clone(),
        }
    }

    pub(super) fn track(&self, context: ContextId, name: String, handle: JoinHandle<()>) {
        self.threads.lock().push(TrackedThread {
            context,
            name,
            handle,
        });
    }

    /// Join every tracked thread that exits before `timeout` elapses
    ///
    /// Threads still running at the deadline stay tracked and are reported as
    /// [`TeardownFailure::DidNotExit`].
    pub fn join_all(&self, timeout: Duration) -> Vec<TeardownFailure> {
        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();

        loop {
            let early: Vec<ContextId> = std::mem::take(&mut *self.early_exits.lock());
            for context in early {
                self.join_one(context, &mut failures);
            }
            if self.threads.lock().is_empty() {
                break;
            }
            match self.exit_receiver.recv_deadline(deadline) {
                Ok(context) => self.join_one(context, &mut failures),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        for thread in self.threads.lock().iter() {
            log::error!("Context thread {} ({}) did not exit", thread.name, thread.context);
            failures.push(TeardownFailure::DidNotExit {
                context: thread.context,
                name: thread.name.clone(),
            });
        }
        failures
    }

    fn join_one(&self, context: ContextId, failures: &mut Vec<TeardownFailure>) {
        let tracked = {
            let mut threads = self.threads.lock();
            threads
                .iter()
                .position(|thread| thread.context == context)
                .map(|index| threads.swap_remove(index))
        };

        // The exit notice can beat `track` for very short-lived contexts.
        let Some(thread) = tracked else {
            self.early_exits.lock().push(context);
            return;
        };

        // The notice fires as the thread body ends, so this join is brief.
        if let Err(payload) = thread.handle.join() {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("<non-string panic payload>"));
            log::error!("Context thread {} ({}) panicked: {}", thread.name, thread.context, message);
            failures.push(TeardownFailure::Panicked {
                context: thread.context,
                name: thread.name,
                message,
            });
        }
    }
}

impl Default for ContextSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSupervisor")
            .field("tracked", &self.tracked())
            .finish()
    }
}

/// Fires when the owning context thread finishes, even by unwinding
pub(super) struct ExitNotice {
    context: ContextId,
    sender: Sender<ContextId>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.sender.send(self.context);
    }
}

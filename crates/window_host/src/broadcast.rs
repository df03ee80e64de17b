//! Sequential cross-context broadcast
//!
//! A broadcast takes one registry snapshot and walks it as a chain of
//! messages: the hop for target N runs the action on N's own context and then
//! posts the hop for target N+1. Exactly one hop is in flight at a time, and
//! no thread ever blocks waiting for another context.
//!
//! A hop that can never run (its context already exited, or it was still
//! queued when the context shut down) is dropped; dropping it counts the
//! target as skipped and moves the chain on. Every broadcast therefore
//! completes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::context::ContextHandle;
use crate::registry::WindowRegistry;

/// Something that owns an execution context a broadcast can hop onto
pub trait BroadcastTarget: Send + Sync + 'static {
    /// Mailbox of the target's own context
    fn mailbox(&self) -> &ContextHandle;
}

/// Action applied to each target, on the target's own context
pub type BroadcastAction<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Outcome of a finished broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Targets the action ran on
    pub delivered: usize,
    /// Targets whose context was gone before the hop could run
    pub skipped: usize,
}

/// Broadcast errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    /// The chain was cut short, e.g. by an action panicking
    #[error("Broadcast interrupted")]
    Interrupted,

    /// The broadcast did not finish in time
    #[error("Broadcast did not finish within {0:?}")]
    Timeout(Duration),
}

/// Completion handle of a running broadcast
#[derive(Debug)]
pub struct Broadcast {
    targets: usize,
    receiver: Receiver<BroadcastReport>,
}

impl Broadcast {
    /// Number of targets in the snapshot
    pub fn targets(&self) -> usize {
        self.targets
    }

    /// Block until every target has been visited
    pub fn wait(self) -> Result<BroadcastReport, BroadcastError> {
        self.receiver.recv().map_err(|_| BroadcastError::Interrupted)
    }

    /// Like [`Broadcast::wait`], bounded by `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> Result<BroadcastReport, BroadcastError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(report) => Ok(report),
            Err(RecvTimeoutError::Timeout) => Err(BroadcastError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(BroadcastError::Interrupted),
        }
    }
}

/// Deliver `action` to every target live in `registry` right now
///
/// Returns immediately; the first hop is posted, never run inline.
pub fn broadcast<T>(registry: &WindowRegistry<T>, action: BroadcastAction<T>) -> Broadcast
where
    T: BroadcastTarget,
{
    let targets: VecDeque<Arc<T>> = registry.snapshot().into();
    let (done, receiver) = crossbeam_channel::bounded(1);
    let count = targets.len();
    log::debug!("Broadcasting to {} window(s)", count);

    Chain {
        remaining: targets,
        action,
        report: BroadcastReport::default(),
        done,
    }
    .advance();

    Broadcast {
        targets: count,
        receiver,
    }
}

struct Chain<T> {
    remaining: VecDeque<Arc<T>>,
    action: BroadcastAction<T>,
    report: BroadcastReport,
    done: Sender<BroadcastReport>,
}

impl<T: BroadcastTarget> Chain<T> {
    fn advance(mut self) {
        let Some(target) = self.remaining.pop_front() else {
            let _ = self.done.send(self.report);
            return;
        };

        let mailbox = target.mailbox().clone();
        let mut hop = Hop {
            chain: Some(self),
            target,
        };
        // On failure the task, and the hop inside it, is dropped right here,
        // which skips this target and advances.
        let _ = mailbox.post(move || hop.run());
    }
}

/// One queued visit; owns the rest of the chain until it runs or is dropped
struct Hop<T: BroadcastTarget> {
    chain: Option<Chain<T>>,
    target: Arc<T>,
}

impl<T: BroadcastTarget> Hop<T> {
    fn run(&mut self) {
        if let Some(mut chain) = self.chain.take() {
            (chain.action)(&self.target);
            chain.report.delivered += 1;
            chain.advance();
        }
    }
}

impl<T: BroadcastTarget> Drop for Hop<T> {
    fn drop(&mut self) {
        if let Some(mut chain) = self.chain.take() {
            log::debug!("Broadcast hop to {} skipped, context is gone", self.target.mailbox().id());
            chain.report.skipped += 1;
            chain.advance();
        }
    }
}

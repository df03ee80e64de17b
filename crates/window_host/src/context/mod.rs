//! Dedicated single-threaded execution contexts
//!
//! Every window runs on its own context: one OS thread draining one FIFO
//! mailbox. Work reaches a context only by being posted to it, so state owned
//! by a context is never touched concurrently.
//!
//! # Module Organization
//!
//! - **`mod.rs`**: mailbox, handles, controller and the factory
//! - **`supervisor`**: tracks spawned threads so their exit can be joined
//!
//! A context can hold one *resident*: an owned value that lives exactly as
//! long as the context keeps running, or until it is explicitly released.
//! Windows use it to keep themselves alive between tasks without holding a
//! strong reference to themselves.

pub mod supervisor;

pub use supervisor::{ContextSupervisor, TeardownFailure};

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

use crate::config::ContextConfig;

/// Unit of work run on a context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// Process-unique identifier of an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// The context running the calling code, if any
pub fn current_context() -> Option<ContextId> {
    CURRENT_CONTEXT.with(Cell::get)
}

/// Execution context errors
#[derive(Error, Debug)]
pub enum ContextError {
    /// The OS refused to start the context thread
    #[error("Failed to spawn context thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The context has already exited and no longer accepts work
    #[error("Execution context {0} is closed")]
    Closed(ContextId),

    /// The context thread ended without completing its shutdown
    #[error("Execution context {0} terminated abnormally")]
    Terminated(ContextId),

    /// Shutdown did not complete in time
    #[error("Execution context {0} did not shut down within {1:?}")]
    Timeout(ContextId, Duration),
}

enum Message {
    Run(Task),
    Adopt(Box<dyn Any + Send>),
    ReleaseResident,
    Shutdown(Option<Sender<()>>),
}

/// Cloneable mailbox of an execution context
#[derive(Clone)]
pub struct ContextHandle {
    id: ContextId,
    name: Arc<str>,
    sender: Sender<Message>,
}

impl ContextHandle {
    /// Identifier of the target context
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Thread name of the target context
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller is running on this context
    pub fn is_current(&self) -> bool {
        current_context() == Some(self.id)
    }

    /// Enqueue `task` to run on the context after everything already queued
    ///
    /// Fails with [`ContextError::Closed`] once the context has exited; the
    /// task is dropped without running in that case.
    pub fn post<F>(&self, task: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Run(Box::new(task)))
    }

    fn send(&self, message: Message) -> Result<(), ContextError> {
        self.sender
            .send(message)
            .map_err(|_| ContextError::Closed(self.id))
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Exclusive controller of an execution context
///
/// Whoever owns the controller decides when the context shuts down. Dropping
/// it without calling [`ContextController::shutdown`] still asks the context
/// to exit once its queue is drained.
pub struct ContextController {
    handle: ContextHandle,
    shutdown_requested: bool,
}

impl ContextController {
    /// Mailbox of the controlled context
    pub fn handle(&self) -> &ContextHandle {
        &self.handle
    }

    /// Identifier of the controlled context
    pub fn id(&self) -> ContextId {
        self.handle.id
    }

    /// Hand `resident` to the context to keep alive
    ///
    /// Replaces (and drops) any previous resident.
    pub fn adopt<R>(&self, resident: R) -> Result<(), ContextError>
    where
        R: Any + Send,
    {
        self.handle.send(Message::Adopt(Box::new(resident)))
    }

    /// Drop the current resident, after all previously queued work has run
    pub fn release_resident(&self) -> Result<(), ContextError> {
        self.handle.send(Message::ReleaseResident)
    }

    /// Request an asynchronous shutdown
    ///
    /// Work already queued still runs, the resident is dropped, then the
    /// thread exits and the returned signal completes.
    pub fn shutdown(mut self) -> ShutdownSignal {
        self.shutdown_requested = true;
        let (done, receiver) = crossbeam_channel::bounded(1);
        if self.handle.send(Message::Shutdown(Some(done))).is_err() {
            log::warn!("Shutdown requested on closed context {}", self.handle.id);
        }
        ShutdownSignal {
            context: self.handle.id,
            receiver,
        }
    }
}

impl Drop for ContextController {
    fn drop(&mut self) {
        if !self.shutdown_requested {
            log::debug!("Controller for {} dropped, requesting shutdown", self.handle.id);
            let _ = self.handle.send(Message::Shutdown(None));
        }
    }
}

impl fmt::Debug for ContextController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextController")
            .field("handle", &self.handle)
            .field("shutdown_requested", &self.shutdown_requested)
            .finish()
    }
}

/// Completion signal of a context shutdown
#[derive(Debug)]
pub struct ShutdownSignal {
    context: ContextId,
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    /// Context being shut down
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Whether the context has finished shutting down
    pub fn is_complete(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Block until the context thread has drained its queue and exited
    pub fn wait(self) -> Result<(), ContextError> {
        self.receiver
            .recv()
            .map_err(|_| ContextError::Terminated(self.context))
    }

    /// Like [`ShutdownSignal::wait`], bounded by `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> Result<(), ContextError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(ContextError::Timeout(self.context, timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ContextError::Terminated(self.context)),
        }
    }
}

/// Creates execution contexts on dedicated threads
#[derive(Debug, Clone)]
pub struct ExecutionContextFactory {
    config: ContextConfig,
    supervisor: Arc<ContextSupervisor>,
}

impl ExecutionContextFactory {
    /// Create a factory that records every spawned thread with `supervisor`
    pub fn new(config: ContextConfig, supervisor: Arc<ContextSupervisor>) -> Self {
        Self { config, supervisor }
    }

    /// Supervisor tracking the spawned context threads
    pub fn supervisor(&self) -> &Arc<ContextSupervisor> {
        &self.supervisor
    }

    /// Start a new context and return its controller
    pub fn spawn(&self) -> Result<ContextController, ContextError> {
        let id = ContextId::next();
        let name: Arc<str> = format!("{}-{}", self.config.thread_name_prefix, id.get()).into();
        let (sender, receiver) = crossbeam_channel::unbounded();

        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let exit_notice = self.supervisor.exit_notice(id);
        let join_handle = builder.spawn(move || {
            let _exit_notice = exit_notice;
            run_context(id, &receiver);
        })?;
        self.supervisor.track(id, name.to_string(), join_handle);

        log::debug!("Started execution context {} ({})", id, name);
        Ok(ContextController {
            handle: ContextHandle { id, name, sender },
            shutdown_requested: false,
        })
    }

    /// Start a new context and run `factory` on it as its first task
    ///
    /// The caller does not wait for `factory`: this returns as soon as the
    /// thread exists. `factory` takes ownership of the new context's
    /// controller.
    pub fn start_on_dedicated_context<F>(&self, factory: F) -> Result<ContextId, ContextError>
    where
        F: FnOnce(ContextController) + Send + 'static,
    {
        let controller = self.spawn()?;
        let handle = controller.handle().clone();
        handle.post(move || factory(controller))?;
        Ok(handle.id())
    }
}

fn run_context(id: ContextId, receiver: &Receiver<Message>) {
    CURRENT_CONTEXT.with(|current| current.set(Some(id)));

    let mut resident: Option<Box<dyn Any + Send>> = None;
    let mut completions = Vec::new();

    while let Ok(message) = receiver.recv() {
        if let Some(done) = dispatch(id, message, &mut resident) {
            completions.extend(done);
            break;
        }
    }

    // Drain whatever was queued before (or while) shutting down.
    loop {
        match receiver.try_recv() {
            Ok(message) => {
                if let Some(done) = dispatch(id, message, &mut resident) {
                    completions.extend(done);
                }
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }

    drop(resident);
    log::debug!("Execution context {} exiting", id);
    for done in completions {
        let _ = done.send(());
    }
}

/// Run one message. Returns `Some` when the message was a shutdown request.
fn dispatch(
    id: ContextId,
    message: Message,
    resident: &mut Option<Box<dyn Any + Send>>,
) -> Option<Option<Sender<()>>> {
    match message {
        Message::Run(task) => task(),
        Message::Adopt(value) => {
            if resident.replace(value).is_some() {
                log::warn!("Context {} replaced its resident", id);
            }
        }
        Message::ReleaseResident => {
            if resident.take().is_none() {
                log::debug!("Context {} had no resident to release", id);
            }
        }
        Message::Shutdown(done) => return Some(done),
    }
    None
}

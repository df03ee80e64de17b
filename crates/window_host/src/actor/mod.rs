//! Window actors
//!
//! A [`WindowActor`] owns one window: its OS window, its content, its
//! execution context, and its place in the registry and the exit gate. All of
//! its state is changed only by tasks running on its own context; the mutex
//! around that state exists so other threads can *inspect* it, and is never
//! contended by writers.
//!
//! # Lifetime
//!
//! The actor never holds a strong reference to itself. Once shown, its
//! self-token is handed to its context as the context's resident, which keeps
//! the actor alive between tasks. The shutdown sequence releases that resident
//! exactly once, after which only tasks still queued on the context (or a
//! broadcast snapshot) hold the actor until it is dropped.
//!
//! # Shutdown sequence
//!
//! 1. destroy notice: leave the registry, drop the gate reference (both
//!    immediately visible process-wide), start content rundown
//! 2. rundown complete (posted back onto the actor's context): drop window
//!    and content, release the self-token, request context shutdown
//! 3. context drained and exited: actor deallocated

pub mod lifecycle;

pub use lifecycle::{ActorState, Ownership};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::broadcast::BroadcastTarget;
use crate::context::{ContextController, ContextError, ContextHandle};
use crate::gate::GateReference;
use crate::host::HostServices;
use crate::platform::{
    Content, ContentError, ContentEvent, EventSink, NativeWindow, ShowHint, WindowError,
    WindowEvent, WindowId,
};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Status text every broadcast writes into each live window
pub const BROADCAST_STATUS: &str = "Broadcast";

/// Process-unique identifier of a window actor
///
/// Assigned at construction, before the OS window (and its [`WindowId`])
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Why a window could not be constructed
#[derive(Error, Debug)]
pub enum ConstructionError {
    /// The window system refused the window
    #[error(transparent)]
    Window(#[from] WindowError),

    /// The content could not be created or attached
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The actor's context would not take its self-token
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Window actor errors
#[derive(Error, Debug)]
pub enum ActorError {
    /// Showing the window failed; nothing was left registered
    #[error("Failed to construct {actor}: {source}")]
    Construction {
        /// Actor that failed
        actor: ActorId,
        /// Underlying failure
        #[source]
        source: ConstructionError,
    },

    /// The operation is not valid in the actor's current state
    #[error("Cannot {operation} {actor} while it is {state}")]
    InvalidState {
        /// Actor addressed
        actor: ActorId,
        /// What was attempted
        operation: &'static str,
        /// State at the time
        state: ActorState,
    },

    /// The operation was called from a thread other than the actor's context
    #[error("{actor} must be driven from its own execution context")]
    WrongContext {
        /// Actor addressed
        actor: ActorId,
    },
}

struct ActorInner {
    state: ActorState,
    controller: Option<ContextController>,
    window: Option<Box<dyn NativeWindow>>,
    window_id: Option<WindowId>,
    content: Option<Box<dyn Content>>,
    gate_reference: Option<GateReference>,
    registered: bool,
    host_visible: bool,
    status: String,
}

impl ActorInner {
    fn transition(&mut self, actor: ActorId, next: ActorState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{actor}: invalid transition {} -> {}",
            self.state,
            next
        );
        log::debug!("{}: {} -> {}", actor, self.state, next);
        self.state = next;
    }
}

/// Keeps an actor alive while it is its context's resident
struct SelfToken(#[allow(dead_code)] Arc<WindowActor>);

/// Owner of one window and its lifecycle
pub struct WindowActor {
    id: ActorId,
    context: ContextHandle,
    services: Arc<HostServices>,
    secondary_launch: bool,
    inner: Mutex<ActorInner>,
}

impl WindowActor {
    /// Bind a new actor to the context behind `controller`
    ///
    /// `secondary_launch` records whether a secondary-button press asked for
    /// this window.
    pub fn new(
        controller: ContextController,
        services: Arc<HostServices>,
        secondary_launch: bool,
    ) -> Arc<Self> {
        let id = ActorId::next();
        log::debug!("{} bound to {}", id, controller.id());
        Arc::new(Self {
            id,
            context: controller.handle().clone(),
            services,
            secondary_launch,
            inner: Mutex::new(ActorInner {
                state: ActorState::Starting,
                controller: Some(controller),
                window: None,
                window_id: None,
                content: None,
                gate_reference: None,
                registered: false,
                host_visible: true,
                status: String::new(),
            }),
        })
    }

    /// Register, create the window and content, and display the window
    ///
    /// Must run on the actor's own context. Either every step succeeds and
    /// the actor is `Visible`, or registration and the gate reference are
    /// undone and a [`ActorError::Construction`] is returned.
    pub fn show(self: &Arc<Self>, hint: ShowHint) -> Result<(), ActorError> {
        if !self.context.is_current() {
            return Err(ActorError::WrongContext { actor: self.id });
        }

        let mut inner = self.inner.lock();
        if inner.state != ActorState::Starting {
            return Err(ActorError::InvalidState {
                actor: self.id,
                operation: "show",
                state: inner.state,
            });
        }

        self.services.registry().add(self);
        inner.registered = true;
        inner.gate_reference = Some(self.services.gate().acquire());

        if let Err(source) = self.construct(&mut inner) {
            self.services.registry().remove(self);
            inner.registered = false;
            inner.gate_reference = None;
            inner.content = None;
            inner.window = None;
            inner.window_id = None;
            log::error!("{}: construction failed: {}", self.id, source);
            return Err(ActorError::Construction {
                actor: self.id,
                source,
            });
        }

        inner.transition(self.id, ActorState::Visible);
        if let Some(window) = inner.window.as_mut() {
            window.show(hint);
        }
        log::info!(
            "{} shown as {:?} on {}",
            self.id,
            inner.window_id,
            self.context.name()
        );
        Ok(())
    }

    fn construct(self: &Arc<Self>, inner: &mut ActorInner) -> Result<(), ConstructionError> {
        let spec = self.services.window_spec(self.secondary_launch);
        let window = self
            .services
            .window_system()
            .create_window(&spec, self.window_sink())?;
        let window_id = window.id();
        inner.window_id = Some(window_id);

        let mut content = self.services.content_factory().create_content(self.content_sink())?;
        content.attach_to(window_id)?;
        let (width, height) = window.client_size();
        content.resize(width, height);

        let status = if self.secondary_launch {
            "Launched by secondary press"
        } else {
            "Ready"
        };
        content.set_status(status);
        inner.status = status.to_owned();
        inner.window = Some(window);
        inner.content = Some(content);

        if let Some(controller) = inner.controller.as_ref() {
            controller.adopt(SelfToken(Arc::clone(self)))?;
        }
        Ok(())
    }

    fn window_sink(self: &Arc<Self>) -> EventSink<WindowEvent> {
        let actor = Arc::downgrade(self);
        let context = self.context.clone();
        EventSink::new(move |event: WindowEvent| {
            let actor = actor.clone();
            let posted = context.post(move || {
                if let Some(actor) = actor.upgrade() {
                    actor.on_window_event(event);
                }
            });
            if posted.is_err() {
                log::debug!("Dropped {:?} for exited context {}", event, context.id());
            }
        })
    }

    fn content_sink(self: &Arc<Self>) -> EventSink<ContentEvent> {
        let actor = Arc::downgrade(self);
        let context = self.context.clone();
        EventSink::new(move |event: ContentEvent| {
            let actor = actor.clone();
            let posted = context.post(move || {
                if let Some(actor) = actor.upgrade() {
                    actor.on_content_event(event);
                }
            });
            if posted.is_err() {
                log::debug!("Dropped {:?} for exited context {}", event, context.id());
            }
        })
    }

    fn on_window_event(self: &Arc<Self>, event: WindowEvent) {
        match event {
            WindowEvent::Resized { width, height } => self.on_resize(width, height),
            WindowEvent::Destroyed => self.on_destroy(),
        }
    }

    fn on_content_event(self: &Arc<Self>, event: ContentEvent) {
        match event {
            ContentEvent::ScaleChanged { scale, visible } => {
                let mut inner = self.inner.lock();
                inner.host_visible = visible;
                if inner.state == ActorState::Visible {
                    let text = scale.to_string();
                    if let Some(content) = inner.content.as_mut() {
                        content.set_status(&text);
                    }
                    inner.status = text;
                }
            }
            ContentEvent::PointerPressed { secondary } => self.on_pointer_pressed(secondary),
        }
    }

    fn on_resize(&self, width: u32, height: u32) {
        if let Some(content) = self.inner.lock().content.as_mut() {
            content.resize(width, height);
        }
    }

    fn on_pointer_pressed(&self, secondary: bool) {
        log::info!(
            "{}: {} press",
            self.id,
            if secondary { "secondary" } else { "primary" }
        );

        // Neither of these waits: the broadcast and the new window proceed on
        // other contexts while this handler returns.
        drop(self.services.broadcast(|actor: &WindowActor| {
            actor.set_status(BROADCAST_STATUS);
        }));
        if let Err(err) = self.services.spawn_window(ShowHint::Normal, secondary) {
            log::error!("{}: failed to spawn sibling window: {}", self.id, err);
        }
    }

    fn on_destroy(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state != ActorState::Visible {
            // A repeated destroy notice finds nothing left to release.
            let removed = self.services.registry().remove(self);
            log::debug!(
                "{}: destroy notice while {} ignored (registry entry removed: {})",
                self.id,
                inner.state,
                removed
            );
            return;
        }

        if !self.services.registry().remove(self) {
            log::warn!("{}: was not registered at destroy", self.id);
        }
        inner.registered = false;
        inner.gate_reference = None;
        inner.transition(self.id, ActorState::ClosingContent);

        match inner.content.as_mut() {
            Some(content) => {
                let actor = Arc::clone(self);
                let context = self.context.clone();
                content.close(Box::new(move |result| {
                    let posted = context.post(move || actor.on_content_closed(result));
                    if posted.is_err() {
                        log::error!("Content rundown finished after {} exited", context.id());
                    }
                }));
            }
            None => {
                drop(inner);
                self.on_content_closed(Ok(()));
            }
        }
    }

    fn on_content_closed(&self, result: Result<(), ContentError>) {
        if let Err(err) = result {
            log::error!("{}: content rundown failed: {}", self.id, err);
            self.services.record_rundown_failure(err);
        }

        let controller = {
            let mut inner = self.inner.lock();
            if inner.state != ActorState::ClosingContent {
                log::warn!("{}: rundown completion while {}", self.id, inner.state);
                return;
            }
            inner.transition(self.id, ActorState::ShuttingDownContext);
            // Thread-affine handles go away here, on the owning context.
            inner.content = None;
            inner.window = None;
            inner.controller.take()
        };

        let Some(controller) = controller else {
            log::error!("{}: no context controller left to shut down", self.id);
            return;
        };
        if let Err(err) = controller.release_resident() {
            log::error!("{}: failed to release self-token: {}", self.id, err);
        }
        drop(controller.shutdown());
        log::info!("{}: context shutdown requested", self.id);
    }

    /// Write `text` into the window's status line
    ///
    /// Safe to call on an actor that is already closing: returns `false` and
    /// touches nothing unless the actor is `Visible` with live content.
    pub fn set_status(&self, text: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ActorState::Visible {
            return false;
        }
        let Some(content) = inner.content.as_mut() else {
            return false;
        };
        content.set_status(text);
        inner.status = text.to_owned();
        true
    }

    /// Process-unique actor id
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// OS window handle, once the window exists
    pub fn window_id(&self) -> Option<WindowId> {
        self.inner.lock().window_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ActorState {
        self.inner.lock().state
    }

    /// Who currently keeps this actor alive
    pub fn ownership(&self) -> Ownership {
        self.state().ownership()
    }

    /// Last status text written to the content
    pub fn status(&self) -> String {
        self.inner.lock().status.clone()
    }

    /// Whether a secondary-button press launched this window
    pub fn launched_by_secondary(&self) -> bool {
        self.secondary_launch
    }

    /// Whether the actor currently counts itself as registered
    pub fn is_registered(&self) -> bool {
        self.inner.lock().registered
    }

    /// Whether the hosting window was last reported visible
    pub fn is_host_visible(&self) -> bool {
        self.inner.lock().host_visible
    }

    /// Mailbox of the actor's own execution context
    pub fn dispatcher_queue(&self) -> &ContextHandle {
        &self.context
    }
}

impl BroadcastTarget for WindowActor {
    fn mailbox(&self) -> &ContextHandle {
        &self.context
    }
}

impl Drop for WindowActor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == ActorState::ShuttingDownContext || inner.state == ActorState::Starting {
            inner.transition(self.id, ActorState::Destroyed);
        } else {
            log::warn!("{} dropped while {}", self.id, inner.state);
        }
    }
}

impl fmt::Debug for WindowActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowActor")
            .field("id", &self.id)
            .field("context", &self.context.id())
            .field("state", &self.state())
            .finish()
    }
}

//! Process-level host
//!
//! [`HostServices`] is the state every window shares: the registry, the exit
//! gate, the context factory and the two collaborators. [`WindowHost`] is the
//! entry point on top of it: it opens the first window, blocks until the gate
//! drains, and then waits for every context thread to exit.

#[cfg(test)]
mod scenarios;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::actor::{ActorError, WindowActor};
use crate::broadcast::{self, Broadcast};
use crate::config::HostConfig;
use crate::context::{
    ContextError, ContextId, ContextSupervisor, ExecutionContextFactory, TeardownFailure,
};
use crate::gate::ReferenceGate;
use crate::platform::{
    ContentError, ContentFactory, HeadlessDesktop, ShowHint, WindowSpec, WindowSystem,
};
use crate::registry::WindowRegistry;

/// Host errors
#[derive(Error, Debug)]
pub enum HostError {
    /// A context could not be started
    #[error("Execution context error: {0}")]
    Context(#[from] ContextError),

    /// A window failed to construct
    #[error("Window construction failed: {0}")]
    Construction(#[source] ActorError),
}

/// What happened over a host's lifetime
#[derive(Debug, Default)]
pub struct HostReport {
    /// Windows that reached the visible state
    pub windows_shown: usize,
    /// Context threads that panicked or did not exit in time
    pub teardown_failures: Vec<TeardownFailure>,
    /// Content rundowns that reported an error
    pub rundown_failures: Vec<ContentError>,
}

impl HostReport {
    /// Whether every window was torn down without incident
    pub fn is_clean(&self) -> bool {
        self.teardown_failures.is_empty() && self.rundown_failures.is_empty()
    }
}

/// Process-wide state shared by every window
pub struct HostServices {
    config: HostConfig,
    registry: WindowRegistry<WindowActor>,
    gate: Arc<ReferenceGate>,
    contexts: ExecutionContextFactory,
    window_system: Arc<dyn WindowSystem>,
    content_factory: Arc<dyn ContentFactory>,
    windows_shown: AtomicUsize,
    construction_failures: Mutex<Vec<ActorError>>,
    rundown_failures: Mutex<Vec<ContentError>>,
}

impl HostServices {
    /// Create the shared state around the given collaborators
    pub fn new(
        config: HostConfig,
        window_system: Arc<dyn WindowSystem>,
        content_factory: Arc<dyn ContentFactory>,
    ) -> Arc<Self> {
        let contexts =
            ExecutionContextFactory::new(config.context.clone(), Arc::new(ContextSupervisor::new()));
        Arc::new(Self {
            config,
            registry: WindowRegistry::new(),
            gate: ReferenceGate::new(),
            contexts,
            window_system,
            content_factory,
            windows_shown: AtomicUsize::new(0),
            construction_failures: Mutex::new(Vec::new()),
            rundown_failures: Mutex::new(Vec::new()),
        })
    }

    /// Live windows
    pub fn registry(&self) -> &WindowRegistry<WindowActor> {
        &self.registry
    }

    /// Exit gate; reaches zero when the last window is gone
    pub fn gate(&self) -> &Arc<ReferenceGate> {
        &self.gate
    }

    /// Factory every window context is started from
    pub fn contexts(&self) -> &ExecutionContextFactory {
        &self.contexts
    }

    /// Host configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Window system collaborator
    pub fn window_system(&self) -> &dyn WindowSystem {
        self.window_system.as_ref()
    }

    /// Content collaborator
    pub fn content_factory(&self) -> &dyn ContentFactory {
        self.content_factory.as_ref()
    }

    /// Creation parameters for a new window
    pub fn window_spec(&self, launched_by_secondary: bool) -> WindowSpec {
        let window = &self.config.window;
        WindowSpec {
            class_name: window.class_name.clone(),
            title: window.title.clone(),
            width: window.width,
            height: window.height,
            launched_by_secondary,
        }
    }

    /// Open a new window on its own context
    ///
    /// Returns once the context exists; the window is created and shown on
    /// that context afterwards. The exit gate is held from this call until
    /// `show` has finished, so the process cannot exit in between.
    pub fn spawn_window(
        self: &Arc<Self>,
        hint: ShowHint,
        launched_by_secondary: bool,
    ) -> Result<ContextId, ContextError> {
        let spawning = self.gate.acquire();
        let services = Arc::clone(self);

        let context = self.contexts.start_on_dedicated_context(move |controller| {
            let actor = WindowActor::new(controller, Arc::clone(&services), launched_by_secondary);
            match actor.show(hint) {
                Ok(()) => {
                    services.windows_shown.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => services.construction_failures.lock().push(err),
            }
            // A failed actor takes its context down with it.
            drop(actor);
            drop(spawning);
        })?;

        log::debug!("Window spawn scheduled on {}", context);
        Ok(context)
    }

    /// Run `action` on every live window, each on its own context
    ///
    /// Returns without waiting; the returned handle can be waited on from
    /// any thread that is not one of the targeted contexts.
    pub fn broadcast<F>(&self, action: F) -> Broadcast
    where
        F: Fn(&WindowActor) + Send + Sync + 'static,
    {
        broadcast::broadcast(&self.registry, Arc::new(action))
    }

    /// Windows shown so far
    pub fn windows_shown(&self) -> usize {
        self.windows_shown.load(Ordering::SeqCst)
    }

    pub(crate) fn record_rundown_failure(&self, error: ContentError) {
        self.rundown_failures.lock().push(error);
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("windows", &self.registry.len())
            .field("gate", &self.gate.count())
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

/// Entry point hosting any number of windows
#[derive(Debug)]
pub struct WindowHost {
    services: Arc<HostServices>,
}

impl WindowHost {
    /// Host windows using the given collaborators
    pub fn new(
        config: HostConfig,
        window_system: Arc<dyn WindowSystem>,
        content_factory: Arc<dyn ContentFactory>,
    ) -> Self {
        Self {
            services: HostServices::new(config, window_system, content_factory),
        }
    }

    /// Host windows on an in-process desktop
    pub fn headless(config: HostConfig, desktop: &HeadlessDesktop) -> Self {
        let desktop = Arc::new(desktop.clone());
        Self::new(config, Arc::clone(&desktop) as Arc<dyn WindowSystem>, desktop)
    }

    /// Shared host state
    pub fn services(&self) -> &Arc<HostServices> {
        &self.services
    }

    /// Open the first window
    pub fn start(&self, hint: ShowHint) -> Result<ContextId, HostError> {
        log::info!("Opening first window ({:?})", hint);
        Ok(self.services.spawn_window(hint, false)?)
    }

    /// Block until the last window is gone and its context thread has exited
    ///
    /// Fails if any window failed to construct.
    pub fn wait(&self) -> Result<HostReport, HostError> {
        self.services.gate.wait_until_zero();
        log::info!("All windows closed, joining execution contexts");

        let timeout = self.services.config.shutdown.join_timeout();
        let teardown_failures = self.services.contexts.supervisor().join_all(timeout);
        for failure in &teardown_failures {
            log::warn!("{}", failure);
        }

        let mut construction_failures = std::mem::take(&mut *self.services.construction_failures.lock());
        if !construction_failures.is_empty() {
            let first = construction_failures.remove(0);
            for other in construction_failures {
                log::error!("{}", other);
            }
            return Err(HostError::Construction(first));
        }

        Ok(HostReport {
            windows_shown: self.services.windows_shown(),
            teardown_failures,
            rundown_failures: std::mem::take(&mut *self.services.rundown_failures.lock()),
        })
    }

    /// Open the first window and block until the host is done
    pub fn run(&self, hint: ShowHint) -> Result<HostReport, HostError> {
        self.start(hint)?;
        let report = self.wait()?;
        log::info!(
            "Host finished: {} window(s) shown, {} teardown failure(s)",
            report.windows_shown,
            report.teardown_failures.len()
        );
        Ok(report)
    }
}

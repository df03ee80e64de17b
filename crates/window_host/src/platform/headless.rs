//! In-process window system and content
//!
//! `HeadlessDesktop` implements both [`WindowSystem`] and [`ContentFactory`]
//! without any OS windows. It records everything the host asks of it and lets
//! a driver (a test, or the demo binary) play the user: press pointer buttons,
//! resize and close windows, and read back the status text each window shows.
//!
//! Content rundown completes on a short-lived helper thread, so the host sees
//! the same asynchronous completion it would from a real content tree.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use super::{
    CloseCallback, Content, ContentError, ContentEvent, ContentEventSink, ContentFactory,
    NativeWindow, ShowHint, WindowError, WindowEvent, WindowEventSink, WindowId, WindowSpec,
    WindowSystem,
};

/// Errors from driving the headless desktop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeadlessError {
    /// No window with this id was ever created
    #[error("Unknown window {0}")]
    UnknownWindow(WindowId),

    /// The window has no content attached
    #[error("No content attached to {0}")]
    NoContent(WindowId),
}

#[derive(Default)]
struct ContentState {
    status: String,
    size: (u32, u32),
    closed: bool,
}

struct ContentSlot {
    state: Arc<Mutex<ContentState>>,
    events: ContentEventSink,
}

struct WindowRecord {
    spec: WindowSpec,
    events: WindowEventSink,
    size: (u32, u32),
    shown: Option<ShowHint>,
    open: bool,
    content: Option<ContentSlot>,
}

#[derive(Default)]
struct Failures {
    window: Option<String>,
    content: Option<String>,
    attach: Option<String>,
    close: Option<String>,
}

/// Window creation parked by [`HeadlessDesktop::hold_next_window`]
#[derive(Default)]
struct WindowHold {
    armed: bool,
    parked: bool,
    released: bool,
}

#[derive(Default)]
struct DesktopState {
    next_id: u64,
    windows: BTreeMap<WindowId, WindowRecord>,
    failures: Failures,
    hold_close: bool,
    held_closes: Vec<(CloseCallback, Result<(), ContentError>)>,
    window_hold: WindowHold,
}

#[derive(Default)]
struct Shared {
    state: Mutex<DesktopState>,
    changed: Condvar,
}

impl Shared {
    fn notify(&self) {
        self.changed.notify_all();
    }
}

/// Headless implementation of the window and content collaborators
#[derive(Clone, Default)]
pub struct HeadlessDesktop {
    shared: Arc<Shared>,
}

impl HeadlessDesktop {
    /// Create an empty desktop
    pub fn new() -> Self {
        Self::default()
    }

    /// Windows created and not yet closed, in creation order
    pub fn open_windows(&self) -> Vec<WindowId> {
        self.shared
            .state
            .lock()
            .windows
            .iter()
            .filter(|(_, record)| record.open)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Block until exactly `count` windows are open and shown
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub fn wait_for_open(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            let shown = state
                .windows
                .values()
                .filter(|record| record.open && record.shown.is_some())
                .count();
            if shown == count {
                return true;
            }
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return false;
            }
        }
    }

    /// Press a pointer button over the window's content
    pub fn press(&self, window: WindowId, secondary: bool) -> Result<(), HeadlessError> {
        self.emit_content(window, ContentEvent::PointerPressed { secondary })
    }

    /// Report a rasterization scale / visibility change for the window's content
    pub fn change_scale(&self, window: WindowId, scale: f64, visible: bool) -> Result<(), HeadlessError> {
        self.emit_content(window, ContentEvent::ScaleChanged { scale, visible })
    }

    /// Resize the window's client area
    pub fn resize(&self, window: WindowId, width: u32, height: u32) -> Result<(), HeadlessError> {
        let events = {
            let mut state = self.shared.state.lock();
            let record = state
                .windows
                .get_mut(&window)
                .ok_or(HeadlessError::UnknownWindow(window))?;
            record.size = (width, height);
            record.events.clone()
        };
        events.send(WindowEvent::Resized { width, height });
        Ok(())
    }

    /// Destroy the window
    ///
    /// Closing an already closed window delivers the destroy notification
    /// again, the way a misbehaving window system might.
    pub fn close(&self, window: WindowId) -> Result<(), HeadlessError> {
        let events = {
            let mut state = self.shared.state.lock();
            let record = state
                .windows
                .get_mut(&window)
                .ok_or(HeadlessError::UnknownWindow(window))?;
            record.open = false;
            record.events.clone()
        };
        self.shared.notify();
        events.send(WindowEvent::Destroyed);
        Ok(())
    }

    /// Status text currently shown by the window's content
    pub fn status(&self, window: WindowId) -> Option<String> {
        self.with_content(window, |content| content.status.clone())
    }

    /// Size the content was last resized to
    pub fn content_size(&self, window: WindowId) -> Option<(u32, u32)> {
        self.with_content(window, |content| content.size)
    }

    /// Whether the window's content has been closed
    pub fn content_closed(&self, window: WindowId) -> Option<bool> {
        self.with_content(window, |content| content.closed)
    }

    /// Show hint the window was displayed with, if it has been shown
    pub fn shown(&self, window: WindowId) -> Option<ShowHint> {
        self.shared.state.lock().windows.get(&window).and_then(|record| record.shown)
    }

    /// Creation parameters of the window
    pub fn spec(&self, window: WindowId) -> Option<WindowSpec> {
        self.shared.state.lock().windows.get(&window).map(|record| record.spec.clone())
    }

    /// Make the next window creation fail
    pub fn fail_next_window(&self, reason: impl Into<String>) {
        self.shared.state.lock().failures.window = Some(reason.into());
    }

    /// Make the next content creation fail
    pub fn fail_next_content(&self, reason: impl Into<String>) {
        self.shared.state.lock().failures.content = Some(reason.into());
    }

    /// Make the next content attach fail
    pub fn fail_next_attach(&self, reason: impl Into<String>) {
        self.shared.state.lock().failures.attach = Some(reason.into());
    }

    /// Make the next content rundown report a failure
    pub fn fail_next_close(&self, reason: impl Into<String>) {
        self.shared.state.lock().failures.close = Some(reason.into());
    }

    /// Keep the next content rundown pending until
    /// [`HeadlessDesktop::finish_held_closes`]
    pub fn hold_next_close(&self) {
        self.shared.state.lock().hold_close = true;
    }

    /// Number of content rundowns currently held
    pub fn held_closes(&self) -> usize {
        self.shared.state.lock().held_closes.len()
    }

    /// Complete every held content rundown, on the calling thread
    pub fn finish_held_closes(&self) {
        let held = std::mem::take(&mut self.shared.state.lock().held_closes);
        for (on_closed, result) in held {
            on_closed(result);
        }
    }

    /// Make the next window creation block until
    /// [`HeadlessDesktop::release_held_window`]
    pub fn hold_next_window(&self) {
        let mut state = self.shared.state.lock();
        state.window_hold = WindowHold {
            armed: true,
            ..WindowHold::default()
        };
    }

    /// Block until a window creation is parked by the hold
    pub fn wait_for_held_window(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.window_hold.parked {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.window_hold.parked;
            }
        }
        true
    }

    /// Let a held window creation proceed
    pub fn release_held_window(&self) {
        self.shared.state.lock().window_hold.released = true;
        self.shared.notify();
    }

    fn emit_content(&self, window: WindowId, event: ContentEvent) -> Result<(), HeadlessError> {
        let events = {
            let state = self.shared.state.lock();
            let record = state
                .windows
                .get(&window)
                .ok_or(HeadlessError::UnknownWindow(window))?;
            record
                .content
                .as_ref()
                .map(|slot| slot.events.clone())
                .ok_or(HeadlessError::NoContent(window))?
        };
        events.send(event);
        Ok(())
    }

    fn with_content<R>(&self, window: WindowId, read: impl FnOnce(&ContentState) -> R) -> Option<R> {
        let state = self.shared.state.lock();
        let slot = state.windows.get(&window)?.content.as_ref()?;
        let content = slot.state.lock();
        Some(read(&content))
    }
}

impl WindowSystem for HeadlessDesktop {
    fn create_window(
        &self,
        spec: &WindowSpec,
        events: WindowEventSink,
    ) -> Result<Box<dyn NativeWindow>, WindowError> {
        let mut state = self.shared.state.lock();
        if std::mem::take(&mut state.window_hold.armed) {
            state.window_hold.parked = true;
            self.shared.notify();
            while !state.window_hold.released {
                self.shared.changed.wait(&mut state);
            }
            state.window_hold = WindowHold::default();
        }
        if let Some(reason) = state.failures.window.take() {
            return Err(WindowError::CreationFailed(reason));
        }

        state.next_id += 1;
        let id = WindowId::from_raw(0x1000 + state.next_id);
        state.windows.insert(
            id,
            WindowRecord {
                spec: spec.clone(),
                events,
                size: (spec.width, spec.height),
                shown: None,
                open: true,
                content: None,
            },
        );
        drop(state);
        self.shared.notify();

        log::trace!("Headless window {} created ({})", id, spec.title);
        Ok(Box::new(HeadlessWindow {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl ContentFactory for HeadlessDesktop {
    fn create_content(&self, events: ContentEventSink) -> Result<Box<dyn Content>, ContentError> {
        if let Some(reason) = self.shared.state.lock().failures.content.take() {
            return Err(ContentError::CreationFailed(reason));
        }

        Ok(Box::new(HeadlessContent {
            state: Arc::new(Mutex::new(ContentState::default())),
            events: Some(events),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct HeadlessWindow {
    id: WindowId,
    shared: Arc<Shared>,
}

impl NativeWindow for HeadlessWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn show(&mut self, hint: ShowHint) {
        if let Some(record) = self.shared.state.lock().windows.get_mut(&self.id) {
            record.shown = Some(hint);
        }
        self.shared.notify();
    }

    fn client_size(&self) -> (u32, u32) {
        self.shared
            .state
            .lock()
            .windows
            .get(&self.id)
            .map_or((0, 0), |record| record.size)
    }
}

impl Drop for HeadlessWindow {
    // Dropping the handle destroys the window without a notification.
    fn drop(&mut self) {
        if let Some(record) = self.shared.state.lock().windows.get_mut(&self.id) {
            record.open = false;
        }
        self.shared.notify();
    }
}

struct HeadlessContent {
    state: Arc<Mutex<ContentState>>,
    events: Option<ContentEventSink>,
    shared: Arc<Shared>,
}

impl Content for HeadlessContent {
    fn attach_to(&mut self, window: WindowId) -> Result<(), ContentError> {
        let mut desktop = self.shared.state.lock();
        if let Some(reason) = desktop.failures.attach.take() {
            return Err(ContentError::AttachFailed { window, reason });
        }
        let record = desktop.windows.get_mut(&window).ok_or_else(|| ContentError::AttachFailed {
            window,
            reason: String::from("no such window"),
        })?;
        let events = self.events.take().ok_or_else(|| ContentError::AttachFailed {
            window,
            reason: String::from("content is already attached"),
        })?;

        let mut content = self.state.lock();
        content.size = record.size;
        record.content = Some(ContentSlot {
            state: Arc::clone(&self.state),
            events,
        });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.state.lock().size = (width, height);
    }

    fn set_status(&mut self, text: &str) {
        let mut content = self.state.lock();
        if !content.closed {
            content.status = text.to_owned();
        }
    }

    fn close(&mut self, on_closed: CloseCallback) {
        self.state.lock().closed = true;

        let result = {
            let mut desktop = self.shared.state.lock();
            let result = desktop
                .failures
                .close
                .take()
                .map_or(Ok(()), |reason| Err(ContentError::CloseFailed(reason)));
            if std::mem::take(&mut desktop.hold_close) {
                desktop.held_closes.push((on_closed, result));
                return;
            }
            result
        };

        complete_rundown(on_closed, result, |job| {
            thread::Builder::new()
                .name(String::from("headless-content-rundown"))
                .spawn(job)
                .map(drop)
        });
    }
}

type RundownJob = Box<dyn FnOnce() + Send>;

/// Report `result` through `on_closed` from a job started by `spawn`
///
/// If the job cannot be started the callback still fires, inline, with a
/// rundown failure.
fn complete_rundown<S>(on_closed: CloseCallback, result: Result<(), ContentError>, spawn: S)
where
    S: FnOnce(RundownJob) -> io::Result<()>,
{
    let slot = Arc::new(Mutex::new(Some(on_closed)));
    let pending = Arc::clone(&slot);
    let spawned = spawn(Box::new(move || {
        let on_closed = pending.lock().take();
        if let Some(on_closed) = on_closed {
            on_closed(result);
        }
    }));

    if let Err(err) = spawned {
        log::error!("Failed to start content rundown thread: {}", err);
        let on_closed = slot.lock().take();
        if let Some(on_closed) = on_closed {
            on_closed(Err(ContentError::CloseFailed(format!(
                "rundown could not start: {err}"
            ))));
        }
    }
}

//! Window system and content collaborators
//!
//! The host does not talk to an OS windowing API or a control tree directly.
//! It needs exactly two collaborators, defined here as traits:
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │     WindowActor                 │
//! └───────┬─────────────────┬───────┘
//!         │ creates         │ creates + attaches
//!  ┌──────▼───────┐  ┌──────▼────────┐
//!  │ WindowSystem │  │ ContentFactory│
//!  └──────┬───────┘  └──────┬────────┘
//!         │ yields          │ yields
//!  ┌──────▼───────┐  ┌──────▼────────┐
//!  │ NativeWindow │  │ Content       │
//!  └──────────────┘  └───────────────┘
//! ```
//!
//! Notifications flow back through [`EventSink`]s handed out at creation time.
//! The actor's sinks post every notification onto the actor's own execution
//! context, so implementations may fire them from any thread.
//!
//! # Module Organization
//!
//! - **`mod.rs`**: collaborator traits, identifiers and events
//! - **`headless`**: in-process implementation of both collaborators

pub mod headless;

pub use headless::{HeadlessDesktop, HeadlessError};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OS-level window identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    /// Wrap a raw handle value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{:#x}", self.0)
    }
}

/// How a window is first displayed
///
/// Mirrors the integer show command the OS hands a process at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShowHint {
    /// Create the window hidden
    Hidden,
    /// Activate and display at its normal size
    #[default]
    Normal,
    /// Display minimized
    Minimized,
    /// Display maximized
    Maximized,
    /// Display without activating
    NoActivate,
    /// Activate and display at the current size
    Show,
    /// Let the launcher decide
    Default,
    /// Any value without a named meaning
    Other(i32),
}

impl ShowHint {
    /// Raw show command value
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Hidden => 0,
            Self::Normal => 1,
            Self::Minimized => 2,
            Self::Maximized => 3,
            Self::NoActivate => 4,
            Self::Show => 5,
            Self::Default => 10,
            Self::Other(raw) => raw,
        }
    }
}

impl From<i32> for ShowHint {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Hidden,
            1 => Self::Normal,
            2 => Self::Minimized,
            3 => Self::Maximized,
            4 => Self::NoActivate,
            5 => Self::Show,
            10 => Self::Default,
            other => Self::Other(other),
        }
    }
}

/// Parameters for creating a top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window class name
    pub class_name: String,
    /// Title bar text
    pub title: String,
    /// Initial client width in pixels
    pub width: u32,
    /// Initial client height in pixels
    pub height: u32,
    /// Whether a secondary-button press launched this window
    pub launched_by_secondary: bool,
}

/// Notification from the window system about one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The client area changed size
    Resized {
        /// New client width
        width: u32,
        /// New client height
        height: u32,
    },
    /// The window has been destroyed
    Destroyed,
}

/// Notification from a content tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEvent {
    /// Rasterization scale or host visibility changed
    ScaleChanged {
        /// New rasterization scale
        scale: f64,
        /// Whether the hosting window is visible
        visible: bool,
    },
    /// A pointer button went down over the content
    PointerPressed {
        /// Whether it was the secondary (right) button
        secondary: bool,
    },
}

/// Callback endpoint for collaborator notifications
///
/// Cheap to clone; may be invoked from any thread.
pub struct EventSink<E> {
    deliver: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> EventSink<E> {
    /// Wrap a delivery function
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Deliver one event
    pub fn send(&self, event: E) {
        (self.deliver)(event);
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Sink for [`WindowEvent`]s
pub type WindowEventSink = EventSink<WindowEvent>;

/// Sink for [`ContentEvent`]s
pub type ContentEventSink = EventSink<ContentEvent>;

/// Completion callback of [`Content::close`]
pub type CloseCallback = Box<dyn FnOnce(Result<(), ContentError>) + Send>;

/// Window system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The window system refused to create the window
    #[error("Window creation failed: {0}")]
    CreationFailed(String),
}

/// Content errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// The content tree could not be created
    #[error("Content creation failed: {0}")]
    CreationFailed(String),

    /// The content could not be attached to its window
    #[error("Failed to attach content to {window}: {reason}")]
    AttachFailed {
        /// Target window
        window: WindowId,
        /// Collaborator's explanation
        reason: String,
    },

    /// Asynchronous rundown reported a failure
    #[error("Content rundown failed: {0}")]
    CloseFailed(String),
}

/// OS windowing collaborator
///
/// Creates top-level windows bound to the calling thread. The host always
/// calls it from the execution context that will own the window.
pub trait WindowSystem: Send + Sync {
    /// Create a window and route its notifications to `events`
    fn create_window(
        &self,
        spec: &WindowSpec,
        events: WindowEventSink,
    ) -> Result<Box<dyn NativeWindow>, WindowError>;
}

/// One OS window owned by an actor
pub trait NativeWindow: Send {
    /// OS handle of the window
    fn id(&self) -> WindowId;

    /// Display the window
    fn show(&mut self, hint: ShowHint);

    /// Current client area size
    fn client_size(&self) -> (u32, u32);
}

/// Content collaborator factory
pub trait ContentFactory: Send + Sync {
    /// Create a content tree and route its notifications to `events`
    fn create_content(&self, events: ContentEventSink) -> Result<Box<dyn Content>, ContentError>;
}

/// Opaque content tree hosted in one window
pub trait Content: Send {
    /// Attach the content to `window`
    fn attach_to(&mut self, window: WindowId) -> Result<(), ContentError>;

    /// Resize the content to the given client size
    fn resize(&mut self, width: u32, height: u32);

    /// Replace the status text
    fn set_status(&mut self, text: &str);

    /// Start the asynchronous rundown
    ///
    /// `on_closed` must be invoked exactly once, from any thread, when the
    /// rundown finishes.
    fn close(&mut self, on_closed: CloseCallback);
}

//! # Window Host
//!
//! Hosts any number of top-level windows in one process, each on its own
//! single-threaded execution context, and keeps the process alive exactly as
//! long as at least one window is.
//!
//! ## Features
//!
//! - **Per-window contexts**: every window's state is touched only by tasks
//!   on its own thread
//! - **Self-owned windows**: a window keeps itself alive as its context's
//!   resident and releases itself when its shutdown completes
//! - **Live-window registry**: weak, process-wide, snapshot on demand
//! - **Cross-window broadcast**: one action visits every live window on that
//!   window's own context, one at a time, never blocking a caller
//! - **Exit gate**: the entry point returns when the last window is gone
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use window_host::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::load_or_default("multi_window.toml")?;
//!     window_host::foundation::logging::init_with_level(&config.logging.level);
//!
//!     let desktop = HeadlessDesktop::new();
//!     let host = WindowHost::headless(config, &desktop);
//!     let report = host.run(ShowHint::Normal)?;
//!     println!("{} window(s) shown", report.windows_shown);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod actor;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod foundation;
pub mod gate;
pub mod host;
pub mod platform;
pub mod registry;

pub use host::{HostError, HostReport, HostServices, WindowHost};

/// Common imports for host users
pub mod prelude {
    pub use crate::{
        actor::{ActorError, ActorId, ActorState, WindowActor},
        broadcast::{Broadcast, BroadcastReport},
        config::{Config, HostConfig},
        context::{ContextHandle, ExecutionContextFactory},
        gate::ReferenceGate,
        platform::{
            Content, ContentFactory, HeadlessDesktop, NativeWindow, ShowHint, WindowId,
            WindowSystem,
        },
        registry::WindowRegistry,
        HostError, HostReport, HostServices, WindowHost,
    };
}

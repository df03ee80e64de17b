//! Window actor lifecycle state machine
//!
//! ```text
//! Starting ──show──▶ Visible ──destroy notice──▶ ClosingContent
//!    │                                                │ content rundown done
//!    │ construction failed                            ▼
//!    └───────────────▶ Destroyed ◀──context exit── ShuttingDownContext
//! ```
//!
//! Every state also names who is keeping the actor alive, see
//! [`ActorState::ownership`].

use std::fmt;

/// Current state of a window actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorState {
    /// Bound to a context, window not created yet
    Starting,
    /// Window shown; registered and holding a gate reference
    Visible,
    /// Destroy notice processed (deregistered, gate released); waiting for
    /// content rundown
    ClosingContent,
    /// Self-token released; waiting for the context to drain and exit
    ShuttingDownContext,
    /// Deallocated
    Destroyed,
}

/// Who holds the strong reference keeping an actor alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The task that created the actor and is running `show`
    CreatingTask,
    /// The actor's context, holding its self-token as resident
    ContextResident,
    /// Tasks still queued on the actor's context
    ContextQueue,
    /// Nobody; the actor is gone
    Released,
}

impl ActorState {
    /// Who owns an actor in this state
    pub const fn ownership(self) -> Ownership {
        match self {
            Self::Starting => Ownership::CreatingTask,
            Self::Visible | Self::ClosingContent => Ownership::ContextResident,
            Self::ShuttingDownContext => Ownership::ContextQueue,
            Self::Destroyed => Ownership::Released,
        }
    }

    /// Whether an actor in this state is present in the registry
    ///
    /// Only `Visible`: the destroy notice deregisters before content rundown
    /// starts, so a `ClosingContent` actor is already gone from the registry.
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Visible)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Visible)
                | (Self::Starting, Self::Destroyed)
                | (Self::Visible, Self::ClosingContent)
                | (Self::ClosingContent, Self::ShuttingDownContext)
                | (Self::ShuttingDownContext, Self::Destroyed)
        )
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Visible => "visible",
            Self::ClosingContent => "closing content",
            Self::ShuttingDownContext => "shutting down context",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

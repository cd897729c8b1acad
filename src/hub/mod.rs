//! The hub: the cooperative single-threaded scheduler the harness drives.
//!
//! The harness treats the scheduler as a black box behind the [`Hub`] trait.
//! A hub can arm cancellable timers, yield the running task back to its loop
//! ([`Hub::switch`]) and, optionally, report a switch count and live resource
//! handles. [`LocalHub`] is a small reference implementation used by the
//! harness's own tests; [`CountingHub`] decorates any hub with a switch
//! counter and is injected explicitly into the code under test.
//!
//! Timers interrupt the running task only at its next yield point: a
//! [`TimerAction::Raise`] timer makes the pending `switch` return the carried
//! [`HubError`].

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod counting;
mod local;
mod resource;
mod timeout;
mod timer;
pub mod wait;

pub use counting::CountingHub;
pub use local::LocalHub;
pub use resource::{ResourceHandle, ResourceProbe};
pub use timeout::{Elapsed, Timeout, TimeoutGuard, TimeoutId};
pub use timer::TimerHeap;
pub use wait::{sleep, AsyncResult, Event, WaitTimeout};

/// A shareable error value whose identity survives cloning.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// A callback run by the hub loop when its timer fires.
pub type Callback = Box<dyn FnOnce() -> Result<(), HubError>>;

/// Identifier of a timer armed on a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Creates a timer id from its raw sequence number.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What happens when a timer fires.
pub enum TimerAction {
    /// Switch back to the waiting task.
    Wake,
    /// Interrupt the waiting task with an error.
    Raise(HubError),
    /// Run a callback inside the loop.
    Call {
        /// Human-readable label used when the callback fails.
        label: String,
        /// The callback itself.
        callback: Callback,
    },
}

impl TimerAction {
    /// Creates a [`TimerAction::Call`] action.
    pub fn call<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce() -> Result<(), HubError> + 'static,
    {
        Self::Call {
            label: label.into(),
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wake => f.write_str("Wake"),
            Self::Raise(err) => f.debug_tuple("Raise").field(err).finish(),
            Self::Call { label, .. } => f.debug_struct("Call").field("label", label).finish(),
        }
    }
}

/// Interrupts and failures delivered by a hub.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// A timeout fired.
    #[error("{0}")]
    Timeout(Elapsed),
    /// A timeout fired that was configured with a substitute error.
    #[error("{0}")]
    Raised(SharedError),
    /// A callback or task failed with a named error kind.
    #[error("{kind}: {message}")]
    Failed {
        /// Error kind, e.g. `ValueError`.
        kind: String,
        /// Error message.
        message: String,
    },
    /// A blocking operation was attempted from inside a loop callback.
    #[error("Impossible to call blocking function in the event loop callback")]
    BlockingInCallback,
    /// Nothing is left that could ever wake the waiting task.
    #[error("This operation would block forever")]
    LoopExit,
}

impl HubError {
    /// Creates a [`HubError::Failed`] error.
    #[must_use]
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns true for [`HubError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The error kind as it appears on the last line of a traceback.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::Raised(_) => "Error",
            Self::Failed { kind, .. } => kind,
            Self::BlockingInCallback => "AssertionError",
            Self::LoopExit => "LoopExit",
        }
    }

    /// The error value as it appears on the last line of a traceback.
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Failed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// The scheduler-under-test.
///
/// All methods take `&self`: hubs are single-threaded and use interior
/// mutability, and are shared through `Rc<dyn Hub>`.
pub trait Hub {
    /// Returns the loop's cached notion of "now".
    fn now(&self) -> Instant;

    /// Refreshes the cached clock.
    fn update_now(&self);

    /// Arms a timer that performs `action` once `after` has elapsed.
    fn schedule(&self, after: Duration, action: TimerAction) -> TimerId;

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Returns true while the timer is armed.
    fn is_pending(&self, id: TimerId) -> bool;

    /// Marks the waiting task runnable; the pending `switch` returns `Ok`.
    fn wake(&self);

    /// Yields the running task to the loop until it is woken or interrupted.
    fn switch(&self) -> Result<(), HubError>;

    /// Number of switches performed so far, if this hub counts them.
    fn switch_count(&self) -> Option<u64> {
        None
    }

    /// Live-resource accounting, if this hub supports it.
    fn resource_probe(&self) -> Option<&dyn ResourceProbe> {
        None
    }
}

impl<H: Hub + ?Sized> Hub for Rc<H> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn update_now(&self) {
        (**self).update_now();
    }

    fn schedule(&self, after: Duration, action: TimerAction) -> TimerId {
        (**self).schedule(after, action)
    }

    fn cancel(&self, id: TimerId) -> bool {
        (**self).cancel(id)
    }

    fn is_pending(&self, id: TimerId) -> bool {
        (**self).is_pending(id)
    }

    fn wake(&self) {
        (**self).wake();
    }

    fn switch(&self) -> Result<(), HubError> {
        (**self).switch()
    }

    fn switch_count(&self) -> Option<u64> {
        (**self).switch_count()
    }

    fn resource_probe(&self) -> Option<&dyn ResourceProbe> {
        (**self).resource_probe()
    }
}

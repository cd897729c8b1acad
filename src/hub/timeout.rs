//! Cancellable timeouts with identity.
//!
//! A [`Timeout`] arms a [`TimerAction::Raise`] timer on a hub. When it fires,
//! the waiting task sees either [`HubError::Timeout`] carrying an [`Elapsed`]
//! stamped with the timeout's [`TimeoutId`], or the substitute error the
//! timeout was configured with. Either way [`Timeout::raised_by`] tells
//! whether a given error came from this particular timeout, which is what
//! keeps nested timeouts apart.

use super::{Hub, HubError, SharedError, TimerAction, TimerId};
use core::fmt;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_TIMEOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(u64);

impl TimeoutId {
    fn next() -> Self {
        Self(NEXT_TIMEOUT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeout#{}", self.0)
    }
}

/// Error delivered when a timeout fires.
///
/// Carries the identity of the timeout that fired, not just the fact that
/// some deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elapsed {
    id: TimeoutId,
    after: Option<Duration>,
    message: Option<String>,
}

impl Elapsed {
    /// Returns the identity of the timeout that fired.
    #[must_use]
    pub const fn id(&self) -> TimeoutId {
        self.id
    }

    /// Returns the configured duration.
    #[must_use]
    pub const fn after(&self) -> Option<Duration> {
        self.after
    }

    /// Returns the configured message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.after {
            Some(after) => write!(f, "timed out after {after:?}")?,
            None => f.write_str("timed out")?,
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Elapsed {}

/// A timeout that can be started, cancelled and recognised when it fires.
///
/// Clones share identity and the armed timer, so a clone handed to a wait
/// operation is "the same" timeout as the original.
#[derive(Clone)]
pub struct Timeout {
    id: TimeoutId,
    hub: Rc<dyn Hub>,
    after: Option<Duration>,
    message: Option<String>,
    exception: Option<SharedError>,
    timer: Rc<Cell<Option<TimerId>>>,
}

impl Timeout {
    /// Creates an unarmed timeout. `None` never fires.
    #[must_use]
    pub fn new(hub: Rc<dyn Hub>, after: Option<Duration>) -> Self {
        Self {
            id: TimeoutId::next(),
            hub,
            after,
            message: None,
            exception: None,
            timer: Rc::new(Cell::new(None)),
        }
    }

    /// Creates and starts a timeout.
    #[must_use]
    pub fn start_new(hub: Rc<dyn Hub>, after: Duration) -> Self {
        let timeout = Self::new(hub, Some(after));
        timeout.start();
        timeout
    }

    /// Attaches a message to the [`Elapsed`] error.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Raises `exception` instead of [`HubError::Timeout`] when firing.
    #[must_use]
    pub fn exception(mut self, exception: SharedError) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Returns this timeout's identity.
    #[must_use]
    pub const fn id(&self) -> TimeoutId {
        self.id
    }

    /// Returns the configured duration.
    #[must_use]
    pub const fn after(&self) -> Option<Duration> {
        self.after
    }

    /// Arms the timer, re-arming it if it is already pending.
    pub fn start(&self) {
        self.cancel();
        let Some(after) = self.after else {
            return;
        };
        let timer = self.hub.schedule(after, TimerAction::Raise(self.error()));
        tracing::debug!(timeout = %self.id, timer = %timer, after_us = after.as_micros() as u64, "timeout started");
        self.timer.set(Some(timer));
    }

    /// Disarms the timer. Returns true if it was still pending.
    pub fn cancel(&self) -> bool {
        let Some(timer) = self.timer.take() else {
            return false;
        };
        let cancelled = self.hub.cancel(timer);
        if cancelled {
            tracing::debug!(timeout = %self.id, timer = %timer, "timeout cancelled");
        }
        cancelled
    }

    /// Returns true while the timer is armed and has not fired.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.timer.get().is_some_and(|t| self.hub.is_pending(t))
    }

    /// Starts the timeout and returns a guard that cancels it when dropped.
    #[must_use = "dropping the guard cancels the timeout immediately"]
    pub fn arm(&self) -> TimeoutGuard {
        self.start();
        self.cancel_on_drop()
    }

    /// Returns a guard that cancels this (already started) timeout when dropped.
    #[must_use = "dropping the guard cancels the timeout immediately"]
    pub fn cancel_on_drop(&self) -> TimeoutGuard {
        TimeoutGuard {
            timeout: self.clone(),
        }
    }

    /// The error this timeout raises when it fires.
    #[must_use]
    pub fn error(&self) -> HubError {
        self.exception.as_ref().map_or_else(
            || {
                HubError::Timeout(Elapsed {
                    id: self.id,
                    after: self.after,
                    message: self.message.clone(),
                })
            },
            |exception| HubError::Raised(Arc::clone(exception)),
        )
    }

    /// Returns true if `err` is this timeout's own [`Elapsed`] error.
    #[must_use]
    pub fn elapsed_in(&self, err: &HubError) -> bool {
        matches!(err, HubError::Timeout(elapsed) if elapsed.id == self.id)
    }

    /// Returns true if `err` was raised by this timeout firing.
    ///
    /// Substitute errors are compared by identity, not by value.
    #[must_use]
    pub fn raised_by(&self, err: &HubError) -> bool {
        match (err, &self.exception) {
            (HubError::Timeout(elapsed), None) => elapsed.id == self.id,
            (HubError::Raised(raised), Some(exception)) => same_error(raised, exception),
            _ => false,
        }
    }
}

fn same_error(a: &SharedError, b: &SharedError) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("id", &self.id)
            .field("after", &self.after)
            .field("message", &self.message)
            .field("exception", &self.exception.is_some())
            .field("timer", &self.timer.get())
            .finish_non_exhaustive()
    }
}

/// Cancels its timeout on every exit path.
#[derive(Debug)]
pub struct TimeoutGuard {
    timeout: Timeout,
}

impl TimeoutGuard {
    /// Returns the guarded timeout.
    #[must_use]
    pub const fn timeout(&self) -> &Timeout {
        &self.timeout
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timeout.cancel();
    }
}

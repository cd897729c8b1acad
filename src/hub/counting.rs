//! Switch-counting hub decorator.

use super::{Hub, HubError, ResourceProbe, TimerAction, TimerId};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Wraps a hub and counts every switch into its loop.
///
/// The counter belongs to this instance: it starts at zero and only grows.
/// Construct a fresh wrapper to start over. Everything else is forwarded
/// untouched, so dispatch order and semantics are the inner hub's.
///
/// ```
/// use hubtest::hub::{CountingHub, Hub, LocalHub, TimerAction};
/// use std::time::Duration;
///
/// let hub = CountingHub::new(LocalHub::new());
/// hub.schedule(Duration::from_millis(1), TimerAction::Wake);
/// hub.switch().unwrap();
/// assert_eq!(hub.switch_count(), Some(1));
/// ```
#[derive(Debug, Default)]
pub struct CountingHub<H> {
    inner: H,
    switches: Cell<u64>,
}

impl<H: Hub> CountingHub<H> {
    /// Wraps `inner` with a zeroed counter.
    #[must_use]
    pub const fn new(inner: H) -> Self {
        Self {
            inner,
            switches: Cell::new(0),
        }
    }

    /// Number of switches observed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.switches.get()
    }

    /// Returns the wrapped hub.
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.inner
    }

    /// Unwraps the inner hub.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: Hub> Hub for CountingHub<H> {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn update_now(&self) {
        self.inner.update_now();
    }

    fn schedule(&self, after: Duration, action: TimerAction) -> TimerId {
        self.inner.schedule(after, action)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.inner.cancel(id)
    }

    fn is_pending(&self, id: TimerId) -> bool {
        self.inner.is_pending(id)
    }

    fn wake(&self) {
        self.inner.wake();
    }

    fn switch(&self) -> Result<(), HubError> {
        self.switches.set(self.switches.get() + 1);
        self.inner.switch()
    }

    fn switch_count(&self) -> Option<u64> {
        Some(self.switches.get())
    }

    fn resource_probe(&self) -> Option<&dyn ResourceProbe> {
        self.inner.resource_probe()
    }
}

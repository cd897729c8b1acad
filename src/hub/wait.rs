//! Blocking primitives built on [`Hub::switch`].
//!
//! These are the operations the contract templates in [`crate::contract`]
//! exercise: a wait-style [`Event`] that answers `None` when its own timeout
//! expires, and a get-style [`AsyncResult`] that raises it. Both let any
//! other interrupt, such as an outer timeout, propagate untouched.

use super::{Hub, HubError, Timeout, TimerAction};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// How long a wait operation may block.
#[derive(Debug, Clone, Default)]
pub enum WaitTimeout {
    /// Block until woken.
    #[default]
    Never,
    /// Block for at most this long.
    After(Duration),
    /// Use a caller-supplied timeout, keeping its identity.
    Using(Timeout),
}

impl WaitTimeout {
    /// Starts the timer for this wait, if any.
    fn start(self, hub: &Rc<dyn Hub>) -> Option<Timeout> {
        match self {
            Self::Never => None,
            Self::After(after) => Some(Timeout::start_new(Rc::clone(hub), after)),
            Self::Using(timeout) => {
                if !timeout.pending() {
                    timeout.start();
                }
                Some(timeout)
            }
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(after: Duration) -> Self {
        Self::After(after)
    }
}

impl From<Option<Duration>> for WaitTimeout {
    fn from(after: Option<Duration>) -> Self {
        after.map_or(Self::Never, Self::After)
    }
}

impl From<Timeout> for WaitTimeout {
    fn from(timeout: Timeout) -> Self {
        Self::Using(timeout)
    }
}

/// Suspends the current task for `duration`.
pub fn sleep(hub: &dyn Hub, duration: Duration) -> Result<(), HubError> {
    let timer = hub.schedule(duration, TimerAction::Wake);
    let result = hub.switch();
    hub.cancel(timer);
    result
}

struct EventState {
    hub: Rc<dyn Hub>,
    flag: Cell<bool>,
    waiters: Cell<usize>,
}

/// A flag tasks can wait on.
#[derive(Clone)]
pub struct Event {
    inner: Rc<EventState>,
}

impl Event {
    /// Creates a cleared event.
    #[must_use]
    pub fn new(hub: Rc<dyn Hub>) -> Self {
        Self {
            inner: Rc::new(EventState {
                hub,
                flag: Cell::new(false),
                waiters: Cell::new(0),
            }),
        }
    }

    /// Sets the flag and wakes the waiting task.
    pub fn set(&self) {
        self.inner.flag.set(true);
        if self.inner.waiters.get() > 0 {
            self.inner.hub.wake();
        }
    }

    /// Clears the flag.
    pub fn clear(&self) {
        self.inner.flag.set(false);
    }

    /// Returns true if the flag is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.flag.get()
    }

    /// Blocks until the flag is set.
    ///
    /// Returns `Ok(None)` when this wait's own timeout expires. Any other
    /// interrupt, including a different timeout, is returned as an error.
    pub fn wait(&self, timeout: impl Into<WaitTimeout>) -> Result<Option<()>, HubError> {
        if self.is_set() {
            return Ok(Some(()));
        }
        let timer = timeout.into().start(&self.inner.hub);
        let _cancel = timer.as_ref().map(Timeout::cancel_on_drop);
        let result = self.block();
        match result {
            Err(err) if timer.as_ref().is_some_and(|t| t.elapsed_in(&err)) => Ok(None),
            other => other.map(Some),
        }
    }

    fn block(&self) -> Result<(), HubError> {
        let state = &self.inner;
        state.waiters.set(state.waiters.get() + 1);
        let result = loop {
            match state.hub.switch() {
                Ok(()) if self.is_set() => break Ok(()),
                Ok(()) => {}
                Err(err) => break Err(err),
            }
        };
        state.waiters.set(state.waiters.get() - 1);
        result
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("set", &self.is_set())
            .field("waiters", &self.inner.waiters.get())
            .finish_non_exhaustive()
    }
}

struct ResultState<T> {
    hub: Rc<dyn Hub>,
    value: RefCell<Option<Result<T, HubError>>>,
    waiters: Cell<usize>,
}

/// A one-shot value a task can block on.
pub struct AsyncResult<T> {
    inner: Rc<ResultState<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone> AsyncResult<T> {
    /// Creates an empty result.
    #[must_use]
    pub fn new(hub: Rc<dyn Hub>) -> Self {
        Self {
            inner: Rc::new(ResultState {
                hub,
                value: RefCell::new(None),
                waiters: Cell::new(0),
            }),
        }
    }

    /// Stores a value and wakes the waiting task.
    pub fn set(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Stores an error and wakes the waiting task.
    pub fn set_error(&self, err: HubError) {
        self.complete(Err(err));
    }

    /// Returns true once a value or error is stored.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Blocks until the result is ready and returns it.
    ///
    /// When the timeout expires its error is raised as is, so a caller-supplied
    /// [`Timeout`] comes back with its identity (or substitute error) intact.
    pub fn get(&self, timeout: impl Into<WaitTimeout>) -> Result<T, HubError> {
        if let Some(value) = self.inner.value.borrow().clone() {
            return value;
        }
        let timer = timeout.into().start(&self.inner.hub);
        let _cancel = timer.as_ref().map(Timeout::cancel_on_drop);
        let state = &self.inner;
        state.waiters.set(state.waiters.get() + 1);
        let result = loop {
            match state.hub.switch() {
                Ok(()) => {
                    if let Some(value) = state.value.borrow().clone() {
                        break value;
                    }
                }
                Err(err) => break Err(err),
            }
        };
        state.waiters.set(state.waiters.get() - 1);
        result
    }

    fn complete(&self, value: Result<T, HubError>) {
        *self.inner.value.borrow_mut() = Some(value);
        if self.inner.waiters.get() > 0 {
            self.inner.hub.wake();
        }
    }
}

impl<T> std::fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult")
            .field("ready", &self.inner.value.borrow().is_some())
            .finish_non_exhaustive()
    }
}

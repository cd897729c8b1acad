//! Reference single-threaded cooperative hub.

use super::resource::{ResourceHandle, ResourceProbe};
use super::timer::TimerHeap;
use super::{Callback, Hub, HubError, TimerAction, TimerId};
use crate::capture::{format_traceback, write_diagnostic};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Stale heap entries tolerated before background reclamation compacts.
const STALE_SLACK: usize = 16;

/// A cooperative hub running one task plus timer callbacks on the current thread.
///
/// [`switch`](Hub::switch) sleeps the thread until the earliest armed timer is
/// due, fires it and repeats until the waiting task is woken, a
/// [`TimerAction::Raise`] timer interrupts it, or nothing is armed anymore.
#[derive(Debug)]
pub struct LocalHub {
    clock: Cell<Instant>,
    timers: RefCell<TimerHeap>,
    actions: RefCell<HashMap<TimerId, TimerAction>>,
    next_timer: Cell<u64>,
    woken: Cell<bool>,
    in_callback: Cell<bool>,
    background_reclaim: Cell<bool>,
    handles: Rc<Cell<i64>>,
}

impl LocalHub {
    /// Creates an idle hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Cell::new(Instant::now()),
            timers: RefCell::new(TimerHeap::new()),
            actions: RefCell::new(HashMap::new()),
            next_timer: Cell::new(0),
            woken: Cell::new(false),
            in_callback: Cell::new(false),
            background_reclaim: Cell::new(true),
            handles: Rc::new(Cell::new(0)),
        }
    }

    /// Opens a handle that counts as a live resource until dropped.
    #[must_use]
    pub fn open_handle(&self) -> ResourceHandle {
        ResourceHandle::open(&self.handles)
    }

    /// Number of armed timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.actions.borrow().len()
    }

    /// Number of heap entries, including cancelled timers not yet reclaimed.
    #[must_use]
    pub fn heap_len(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Returns true while stale entries are compacted during `switch`.
    #[must_use]
    pub fn background_reclaim(&self) -> bool {
        self.background_reclaim.get()
    }

    fn reclaim(&self, force: bool) {
        let actions = self.actions.borrow();
        let mut timers = self.timers.borrow_mut();
        if !force && timers.len() <= actions.len() * 2 + STALE_SLACK {
            return;
        }
        let dropped = timers.retain(|id| actions.contains_key(&id));
        if dropped > 0 {
            tracing::trace!(dropped, remaining = timers.len(), "reclaimed stale timers");
        }
    }

    fn run_callback(&self, label: &str, callback: Callback) {
        let result = {
            let _scope = CallbackScope::enter(&self.in_callback);
            callback()
        };
        if let Err(err) = result {
            tracing::debug!(label = %label, error = %err, "hub callback failed");
            let frame = format!("File \"<hub>\", in {label}");
            let mut report = format_traceback(&[frame], err.kind_name(), &err.value());
            let _ = write!(report, "{label} failed with {}\n\n", err.kind_name());
            write_diagnostic(&report);
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub for LocalHub {
    fn now(&self) -> Instant {
        self.clock.get()
    }

    fn update_now(&self) {
        self.clock.set(Instant::now());
    }

    fn schedule(&self, after: Duration, action: TimerAction) -> TimerId {
        self.update_now();
        let id = TimerId::from_raw(self.next_timer.get());
        self.next_timer.set(id.as_u64() + 1);
        self.timers.borrow_mut().insert(id, self.now() + after);
        tracing::trace!(timer = %id, after_us = after.as_micros() as u64, action = ?action, "timer armed");
        self.actions.borrow_mut().insert(id, action);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let cancelled = self.actions.borrow_mut().remove(&id).is_some();
        if cancelled {
            tracing::trace!(timer = %id, "timer cancelled");
        }
        cancelled
    }

    fn is_pending(&self, id: TimerId) -> bool {
        self.actions.borrow().contains_key(&id)
    }

    fn wake(&self) {
        self.woken.set(true);
    }

    fn switch(&self) -> Result<(), HubError> {
        if self.in_callback.get() {
            return Err(HubError::BlockingInCallback);
        }
        loop {
            if self.woken.replace(false) {
                return Ok(());
            }
            if self.background_reclaim.get() {
                self.reclaim(false);
            }
            let Some((id, deadline)) = self.timers.borrow_mut().pop() else {
                return Err(HubError::LoopExit);
            };
            let Some(action) = self.actions.borrow_mut().remove(&id) else {
                continue;
            };
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
            self.update_now();
            match action {
                TimerAction::Wake => self.woken.set(true),
                TimerAction::Raise(err) => {
                    tracing::trace!(timer = %id, error = %err, "timer interrupted waiting task");
                    return Err(err);
                }
                TimerAction::Call { label, callback } => self.run_callback(&label, callback),
            }
        }
    }

    fn resource_probe(&self) -> Option<&dyn ResourceProbe> {
        Some(self)
    }
}

impl ResourceProbe for LocalHub {
    fn live_handles(&self) -> i64 {
        self.pending_timers() as i64 + self.handles.get()
    }

    fn set_background_reclaim(&self, enabled: bool) {
        self.background_reclaim.set(enabled);
    }

    fn collect(&self) {
        self.reclaim(true);
    }
}

/// Marks the hub as running a callback; cleared on every exit path.
struct CallbackScope<'a>(&'a Cell<bool>);

impl<'a> CallbackScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

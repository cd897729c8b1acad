//! Live-resource accounting used by the leak detector.

use std::cell::Cell;
use std::rc::Rc;

/// Reports how many resource handles a hub currently keeps alive.
///
/// Hubs that cannot account for their resources simply return `None` from
/// [`Hub::resource_probe`](super::Hub::resource_probe), which turns leak
/// checking into a passthrough.
pub trait ResourceProbe {
    /// Number of live handles (armed timers, open handles, ...).
    fn live_handles(&self) -> i64;

    /// Enables or disables incidental reclamation while the loop runs.
    fn set_background_reclaim(&self, enabled: bool);

    /// Forces a full reclamation pass.
    fn collect(&self);
}

/// An open handle counted by its hub until dropped.
#[derive(Debug)]
pub struct ResourceHandle {
    live: Rc<Cell<i64>>,
}

impl ResourceHandle {
    pub(crate) fn open(live: &Rc<Cell<i64>>) -> Self {
        live.set(live.get() + 1);
        Self {
            live: Rc::clone(live),
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

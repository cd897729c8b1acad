//! Leak detector: repeats a test until live resource counts stop growing.
//!
//! Each iteration forces a collection, samples [`ResourceProbe::live_handles`],
//! runs the test and its fixture's cleanup, then samples again. The first
//! zero delta ends the session; [`LEAK_CHECK_ITERATIONS`] non-zero deltas in
//! a row fail it with [`ErrorKind::ResourceGrowth`](crate::ErrorKind).
//! Background reclamation is paused for the whole session so it cannot skew
//! the samples.

use crate::case::{Fixture, TestFn};
use crate::error::{Error, Result, TestResult};
use crate::hub::ResourceProbe;
use std::rc::Rc;
use std::sync::Arc;

/// Maximum invocations per leak-check session.
pub const LEAK_CHECK_ITERATIONS: usize = 4;

/// One leak-check run over a probe.
pub struct LeakCheckSession<'a> {
    probe: &'a dyn ResourceProbe,
    deltas: Vec<i64>,
    limit: usize,
}

impl<'a> LeakCheckSession<'a> {
    /// Creates a session with the default iteration cap.
    #[must_use]
    pub fn new(probe: &'a dyn ResourceProbe) -> Self {
        Self::with_limit(probe, LEAK_CHECK_ITERATIONS)
    }

    /// Creates a session with a custom iteration cap.
    #[must_use]
    pub fn with_limit(probe: &'a dyn ResourceProbe, limit: usize) -> Self {
        Self {
            probe,
            deltas: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Deltas recorded so far.
    #[must_use]
    pub fn deltas(&self) -> &[i64] {
        &self.deltas
    }

    /// Runs `body` until a zero delta is observed.
    ///
    /// Returns every delta recorded. An error from `body` ends the session
    /// immediately and is returned unchanged.
    pub fn run<F>(mut self, mut body: F) -> Result<Vec<i64>>
    where
        F: FnMut() -> TestResult,
    {
        let _pause = ReclaimPause::new(self.probe);
        for iteration in 0..self.limit {
            self.probe.collect();
            let before = self.probe.live_handles();
            body()?;
            let after = self.probe.live_handles();
            let delta = after - before;
            tracing::debug!(iteration, before, after, delta, "leak-check sample");
            self.deltas.push(delta);
            if delta == 0 {
                return Ok(self.deltas);
            }
        }
        tracing::warn!(deltas = ?self.deltas, "live resource handles kept growing");
        Err(Error::resource_growth(self.deltas))
    }
}

impl std::fmt::Debug for LeakCheckSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakCheckSession")
            .field("deltas", &self.deltas)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Disables background reclamation until dropped, collecting on both ends.
struct ReclaimPause<'a> {
    probe: &'a dyn ResourceProbe,
}

impl<'a> ReclaimPause<'a> {
    fn new(probe: &'a dyn ResourceProbe) -> Self {
        probe.set_background_reclaim(false);
        probe.collect();
        Self { probe }
    }
}

impl Drop for ReclaimPause<'_> {
    fn drop(&mut self) {
        self.probe.set_background_reclaim(true);
        self.probe.collect();
    }
}

/// Wraps `test` in a leak-check session.
///
/// When the fixture's hub has no [`ResourceProbe`] the test runs once,
/// unchecked.
#[must_use]
pub fn wrap_leak_check<S: Fixture>(test: TestFn<S>) -> TestFn<S> {
    Arc::new(move |fixture: &mut S| {
        let hub = Rc::clone(fixture.case().hub());
        let Some(probe) = hub.resource_probe() else {
            tracing::trace!(
                test = %fixture.case().id(),
                "hub reports no resources, leak check skipped"
            );
            return test(fixture);
        };
        let deltas = LeakCheckSession::new(probe).run(|| {
            let result = test(fixture);
            fixture.cleanup();
            result
        })?;
        tracing::debug!(test = %fixture.case().id(), ?deltas, "leak check passed");
        Ok(())
    })
}

#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use hubtest::case::{Fixture, TestCase};
use hubtest::config::HarnessConfig;
use hubtest::hub::{AsyncResult, CountingHub, Event, Hub, LocalHub, ResourceHandle};
use hubtest::runner::Harness;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub use hubtest::test_utils::init_test_logging;

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "HUBTEST_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// A counting hub plus a harness running on it.
pub fn counting_harness() -> (Rc<CountingHub<LocalHub>>, Harness) {
    init_test_logging();
    let hub = Rc::new(CountingHub::new(LocalHub::new()));
    let dyn_hub: Rc<dyn Hub> = Rc::clone(&hub) as Rc<dyn Hub>;
    let harness = Harness::new(dyn_hub).with_config(HarnessConfig::new());
    (hub, harness)
}

/// State shared by every [`HandleFixture`] a factory builds.
#[derive(Default, Clone)]
pub struct Shared {
    /// Handles deliberately kept alive past the test.
    pub kept: Rc<RefCell<Vec<ResourceHandle>>>,
    /// Number of fixture cleanups so far.
    pub cleanups: Rc<Cell<usize>>,
}

/// Fixture that can hold resource handles across invocations.
pub struct HandleFixture {
    pub case: TestCase,
    pub hub: Rc<CountingHub<LocalHub>>,
    pub shared: Shared,
    pub scratch: Vec<ResourceHandle>,
}

impl HandleFixture {
    pub fn factory(hub: &Rc<CountingHub<LocalHub>>, shared: &Shared) -> impl FnMut(TestCase) -> Self {
        let hub = Rc::clone(hub);
        let shared = shared.clone();
        move |case| Self {
            case,
            hub: Rc::clone(&hub),
            shared: shared.clone(),
            scratch: Vec::new(),
        }
    }

    /// Opens a handle that lives until the fixture's cleanup.
    pub fn open_scratch(&mut self) {
        let handle = self.hub.inner().open_handle();
        self.scratch.push(handle);
    }

    /// Opens a handle that outlives the test.
    pub fn leak(&self) {
        let handle = self.hub.inner().open_handle();
        self.shared.kept.borrow_mut().push(handle);
    }

    /// Number of handles leaked so far.
    pub fn leaked(&self) -> usize {
        self.shared.kept.borrow().len()
    }
}

impl Fixture for HandleFixture {
    fn case(&self) -> &TestCase {
        &self.case
    }

    fn case_mut(&mut self) -> &mut TestCase {
        &mut self.case
    }

    fn cleanup(&mut self) {
        self.shared.cleanups.set(self.shared.cleanups.get() + 1);
        self.scratch.clear();
    }
}

/// Fixture around an [`Event`].
pub struct EventFixture {
    pub case: TestCase,
    pub event: Event,
}

impl EventFixture {
    pub fn new(case: TestCase) -> Self {
        let event = Event::new(Rc::clone(case.hub()));
        Self { case, event }
    }
}

impl Fixture for EventFixture {
    fn case(&self) -> &TestCase {
        &self.case
    }

    fn case_mut(&mut self) -> &mut TestCase {
        &mut self.case
    }
}

/// Fixture around an [`AsyncResult`].
pub struct ResultFixture {
    pub case: TestCase,
    pub result: AsyncResult<String>,
}

impl ResultFixture {
    pub fn new(case: TestCase) -> Self {
        let result = AsyncResult::new(Rc::clone(case.hub()));
        Self { case, result }
    }
}

impl Fixture for ResultFixture {
    fn case(&self) -> &TestCase {
        &self.case
    }

    fn case_mut(&mut self) -> &mut TestCase {
        &mut self.case
    }
}

//! Runs instrumented suites against a hub.

use crate::case::{Fixture, TestCase, TestId};
use crate::config::{self, HarnessConfig};
use crate::error::{Error, Result, TestResult};
use crate::hub::Hub;
use crate::report::{SuiteReport, TestRecord};
use crate::suite::{RegisteredTest, Suite};
use crate::switch_policy::{NoSwitchPolicy, SwitchPolicy};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Instant;

/// Runs tests sequentially on one hub.
///
/// The hub is injected: wrap it in a [`CountingHub`](crate::hub::CountingHub)
/// to get switch deltas in reports.
///
/// Each test gets a fresh fixture from the factory and goes through:
/// harness set-up, switch-policy resolution, fixture set-up, the
/// instrumented body, fixture cleanup, fixture tear-down and harness
/// tear-down. Panics are caught and reported after the tear-down hooks run.
pub struct Harness {
    hub: Rc<dyn Hub>,
    config: HarnessConfig,
    switch_policy: Rc<dyn SwitchPolicy>,
}

impl Harness {
    /// Creates a harness using the process-wide configuration.
    #[must_use]
    pub fn new(hub: Rc<dyn Hub>) -> Self {
        Self {
            hub,
            config: config::global(),
            switch_policy: Rc::new(NoSwitchPolicy),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the switch-policy lookup.
    #[must_use]
    pub fn with_switch_policy(mut self, policy: impl SwitchPolicy + 'static) -> Self {
        self.switch_policy = Rc::new(policy);
        self
    }

    /// The hub under test.
    #[must_use]
    pub const fn hub(&self) -> &Rc<dyn Hub> {
        &self.hub
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> HarnessConfig {
        self.config
    }

    /// Builds the [`TestCase`] for one run of `test`.
    #[must_use]
    pub fn case_for<S>(&self, suite: &Suite<S>, test: &RegisteredTest<S>) -> TestCase {
        let mut case = TestCase::new(
            TestId::new(suite.file_stem(), suite.class_name(), test.name()),
            Rc::clone(&self.hub),
            test.policy(),
            self.config,
        );
        case.set_switch_expected(suite.switch_expected());
        case
    }

    /// Runs the test named `name`.
    pub fn run_test<S, F>(&self, suite: &Suite<S>, name: &str, factory: F) -> Result<TestRecord>
    where
        S: Fixture,
        F: FnOnce(TestCase) -> S,
    {
        let test = suite.get(name).ok_or_else(|| {
            Error::registration(format!(
                "{}.{} has no test {name:?}",
                suite.file_stem(),
                suite.class_name()
            ))
        })?;
        Ok(self.execute(suite, test, factory))
    }

    /// Runs every test of `suite` in registration order.
    pub fn run_suite<S, F>(&self, suite: &Suite<S>, mut factory: F) -> SuiteReport
    where
        S: Fixture,
        F: FnMut(TestCase) -> S,
    {
        tracing::info!(
            file = %suite.file_stem(),
            class = %suite.class_name(),
            tests = suite.len(),
            "suite started"
        );
        let mut report = SuiteReport::new();
        for test in suite.tests() {
            report.push(self.execute(suite, test, &mut factory));
        }
        tracing::info!(
            class = %suite.class_name(),
            failed = report.failed().count(),
            "suite finished"
        );
        report
    }

    fn execute<S, F>(&self, suite: &Suite<S>, test: &RegisteredTest<S>, factory: F) -> TestRecord
    where
        S: Fixture,
        F: FnOnce(TestCase) -> S,
    {
        let case = self.case_for(suite, test);
        let fullname = case.fullname();
        tracing::info!(test = %fullname, policy = ?test.policy(), "test started");
        let start = Instant::now();
        let mut fixture = factory(case);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let case = fixture.case_mut();
            case.set_up();
            case.resolve_switch_expected(&*self.switch_policy);
            fixture.set_up()?;
            test.invoke(&mut fixture)
        }));
        let switches = fixture.case().switches_since_setup();
        let switch_expected = fixture.case().switch_expected();

        let teardown = panic::catch_unwind(AssertUnwindSafe(|| {
            fixture.cleanup();
            let result = fixture.tear_down();
            fixture.case_mut().tear_down();
            result
        }));

        let result = match (settle(outcome), settle(teardown)) {
            (Err(err), _) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        };
        match &result {
            Ok(()) => tracing::info!(test = %fullname, ?switches, "test passed"),
            Err(err) => tracing::warn!(test = %fullname, kind = %err.kind(), error = %err, "test failed"),
        }
        TestRecord::new(
            fullname,
            result,
            start.elapsed(),
            switches,
            switch_expected,
            test.policy(),
        )
    }
}

fn settle(outcome: std::thread::Result<TestResult>) -> TestResult {
    outcome.unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())))
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

//! Per-test state and the fixture seam.

use crate::capture::{MatchTier, StderrCapture};
use crate::config::HarnessConfig;
use crate::error::{Error, Result, TestResult};
use crate::hub::{Hub, HubError};
use crate::policy::EffectivePolicy;
use crate::switch_policy::{SwitchExpected, SwitchPolicy};
use core::fmt;
use std::io::Write as _;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// A test body. Shared, so wrapping an uninstrumented test is free.
pub type TestFn<S> = Arc<dyn Fn(&mut S) -> TestResult + Send + Sync>;

/// Returns the file name of `path` without directories or extension.
///
/// ```
/// assert_eq!(hubtest::case::file_stem("tests/test__event.rs"), "test__event");
/// ```
#[must_use]
pub fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
}

/// Identifies one test: file stem, class and method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    file_stem: String,
    class_name: String,
    method: String,
}

impl TestId {
    /// Creates a test id.
    #[must_use]
    pub fn new(
        file_stem: impl Into<String>,
        class_name: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            file_stem: file_stem.into(),
            class_name: class_name.into(),
            method: method.into(),
        }
    }

    /// The file stem.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// The class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.file_stem, self.class_name, self.method)
    }
}

/// The harness-owned state of one running test.
///
/// Holds the resolved policy, the hub under test, the switch-count snapshot
/// taken in [`set_up`](Self::set_up) and the test's diagnostic capture.
pub struct TestCase {
    id: TestId,
    hub: Rc<dyn Hub>,
    policy: EffectivePolicy,
    switch_snapshot: Option<u64>,
    switch_expected: SwitchExpected,
    capture: StderrCapture,
}

impl TestCase {
    /// Creates the state for one test run.
    #[must_use]
    pub fn new(
        id: TestId,
        hub: Rc<dyn Hub>,
        policy: EffectivePolicy,
        config: HarnessConfig,
    ) -> Self {
        Self {
            id,
            hub,
            policy,
            switch_snapshot: None,
            switch_expected: SwitchExpected::Default,
            capture: StderrCapture::new(config),
        }
    }

    /// The hub under test.
    #[must_use]
    pub const fn hub(&self) -> &Rc<dyn Hub> {
        &self.hub
    }

    /// The test's identity.
    #[must_use]
    pub const fn id(&self) -> &TestId {
        &self.id
    }

    /// The resolved instrumentation policy.
    #[must_use]
    pub const fn policy(&self) -> EffectivePolicy {
        self.policy
    }

    /// The effective timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.policy.timeout
    }

    /// Whether the leak detector wraps this test.
    #[must_use]
    pub const fn leak_check(&self) -> bool {
        self.policy.leak_check
    }

    /// The method name.
    #[must_use]
    pub fn testname(&self) -> &str {
        self.id.method()
    }

    /// `Class.method`.
    #[must_use]
    pub fn testcasename(&self) -> String {
        format!("{}.{}", self.id.class_name(), self.id.method())
    }

    /// `stem.Class.method`, the key for switch-policy lookup.
    #[must_use]
    pub fn fullname(&self) -> String {
        self.id.to_string()
    }

    /// The current switch classification.
    #[must_use]
    pub const fn switch_expected(&self) -> SwitchExpected {
        self.switch_expected
    }

    /// Overrides the switch classification.
    pub fn set_switch_expected(&mut self, expected: SwitchExpected) {
        self.switch_expected = expected;
    }

    /// Looks the classification up, unless one was already set.
    pub fn resolve_switch_expected(&mut self, policy: &dyn SwitchPolicy) -> SwitchExpected {
        if self.switch_expected == SwitchExpected::Default {
            self.switch_expected = policy.expected(&self.fullname());
            tracing::debug!(
                test = %self.id,
                expected = %self.switch_expected,
                "switch expectation resolved"
            );
        }
        self.switch_expected
    }

    /// Refreshes the hub clock and snapshots the switch count.
    pub fn set_up(&mut self) {
        self.hub.update_now();
        self.switch_snapshot = self.hub.switch_count();
    }

    /// Switches performed since [`set_up`](Self::set_up), if the hub counts.
    #[must_use]
    pub fn switches_since_setup(&self) -> Option<u64> {
        let now = self.hub.switch_count()?;
        Some(now.saturating_sub(self.switch_snapshot?))
    }

    /// Checks the switches since set-up against the classification.
    ///
    /// Passes trivially when the hub does not count switches.
    pub fn assert_switch_expected(&self) -> TestResult {
        let Some(switches) = self.switches_since_setup() else {
            return Ok(());
        };
        if self.switch_expected.accepts(switches) {
            Ok(())
        } else {
            Err(Error::assertion(format!(
                "{} expected {} but performed {switches} switches",
                self.id, self.switch_expected
            )))
        }
    }

    /// Starts capturing diagnostics.
    pub fn hook_stderr(&mut self) {
        self.capture.hook();
    }

    /// Stops capturing and returns what was recorded.
    pub fn unhook_stderr(&mut self) -> Option<&str> {
        self.capture.unhook()
    }

    /// See [`StderrCapture::assert_no_stderr`].
    pub fn assert_no_stderr(&mut self) -> TestResult {
        self.capture.assert_no_stderr()
    }

    /// See [`StderrCapture::assert_stderr`].
    pub fn assert_stderr(&mut self, message: &str) -> Result<Option<MatchTier>> {
        self.capture.assert_stderr(message)
    }

    /// See [`StderrCapture::assert_stderr_traceback`].
    pub fn assert_stderr_traceback(&mut self, kind: &str, value: Option<&str>) -> TestResult {
        self.capture.assert_stderr_traceback(kind, value)
    }

    /// See [`StderrCapture::assert_stderr_traceback_of`].
    pub fn assert_stderr_traceback_of(&mut self, err: &HubError) -> TestResult {
        self.capture.assert_stderr_traceback_of(err)
    }

    /// See [`StderrCapture::assert_mainloop_assertion`].
    pub fn assert_mainloop_assertion(&mut self, message: Option<&str>) -> TestResult {
        self.capture.assert_mainloop_assertion(message)
    }

    /// The capture itself.
    pub fn stderr_mut(&mut self) -> &mut StderrCapture {
        &mut self.capture
    }

    /// Unhooks and replays any unconsumed diagnostics on the real stderr.
    pub fn tear_down(&mut self) {
        let Some(text) = self.capture.take_recorded() else {
            return;
        };
        if !text.is_empty() {
            tracing::debug!(test = %self.id, bytes = text.len(), "replaying unconsumed diagnostics");
            let _ = std::io::stderr().write_all(text.as_bytes());
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("switch_snapshot", &self.switch_snapshot)
            .field("switch_expected", &self.switch_expected)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

/// User state wrapped around a [`TestCase`].
///
/// Suites are generic over their fixture type; every hook has a default so a
/// bare [`TestCase`] is itself a fixture.
pub trait Fixture: 'static {
    /// The harness-owned state.
    fn case(&self) -> &TestCase;

    /// The harness-owned state, mutably.
    fn case_mut(&mut self) -> &mut TestCase;

    /// Runs after the harness's own set-up.
    fn set_up(&mut self) -> TestResult {
        Ok(())
    }

    /// Runs before the harness's own tear-down.
    fn tear_down(&mut self) -> TestResult {
        Ok(())
    }

    /// Releases per-invocation resources.
    ///
    /// Called after every leak-check iteration and once more at tear-down.
    fn cleanup(&mut self) {}
}

impl Fixture for TestCase {
    fn case(&self) -> &TestCase {
        self
    }

    fn case_mut(&mut self) -> &mut TestCase {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::write_diagnostic;
    use crate::hub::{sleep, CountingHub, LocalHub};
    use crate::switch_policy::SwitchTable;

    fn case_on(hub: Rc<dyn Hub>) -> TestCase {
        TestCase::new(
            TestId::new("test__event", "TestEvent", "test_wait"),
            hub,
            EffectivePolicy::default(),
            HarnessConfig::new(),
        )
    }

    #[test]
    fn names_compose() {
        let case = case_on(Rc::new(LocalHub::new()));
        assert_eq!(case.testname(), "test_wait");
        assert_eq!(case.testcasename(), "TestEvent.test_wait");
        assert_eq!(case.fullname(), "test__event.TestEvent.test_wait");
    }

    #[test]
    fn file_stem_strips_dirs_and_extension() {
        assert_eq!(file_stem("/a/b/test__queue.py"), "test__queue");
        assert_eq!(file_stem("plain"), "plain");
    }

    #[test]
    fn switch_expectation_resolves_once() {
        let mut case = case_on(Rc::new(LocalHub::new()));
        let table = SwitchTable::new().prefix("test__event", SwitchExpected::Switch);
        assert_eq!(case.resolve_switch_expected(&table), SwitchExpected::Switch);
        let other = SwitchTable::new().fallback(SwitchExpected::NoSwitch);
        assert_eq!(case.resolve_switch_expected(&other), SwitchExpected::Switch);
    }

    #[test]
    fn switch_delta_is_checked_against_expectation() {
        let hub: Rc<dyn Hub> = Rc::new(CountingHub::new(LocalHub::new()));
        let mut case = case_on(Rc::clone(&hub));
        case.set_switch_expected(SwitchExpected::NoSwitch);
        case.set_up();
        assert_eq!(case.switches_since_setup(), Some(0));
        case.assert_switch_expected().expect("no switches yet");
        sleep(&*hub, Duration::from_millis(1)).expect("sleep");
        assert_eq!(case.switches_since_setup(), Some(1));
        assert!(case.assert_switch_expected().is_err());
        case.set_switch_expected(SwitchExpected::Switch);
        case.assert_switch_expected().expect("switched");
    }

    #[test]
    fn uncounted_hub_passes_switch_check() {
        let mut case = case_on(Rc::new(LocalHub::new()));
        case.set_switch_expected(SwitchExpected::Switch);
        case.set_up();
        assert_eq!(case.switches_since_setup(), None);
        case.assert_switch_expected().expect("cannot check");
    }

    #[test]
    fn tear_down_unhooks() {
        let mut case = case_on(Rc::new(LocalHub::new()));
        case.hook_stderr();
        write_diagnostic("");
        case.tear_down();
        assert!(!crate::capture::is_hooked());
        assert_eq!(case.unhook_stderr(), None);
    }
}

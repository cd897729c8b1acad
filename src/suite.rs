//! Suite registration and instrumentation.
//!
//! A [`SuiteBuilder`] collects test methods together with class-level and
//! per-method policy overrides. [`SuiteBuilder::build`] validates the names,
//! resolves each method's [`EffectivePolicy`] and composes the wrappers once:
//!
//! ```text
//! wrap_leak_check(wrap_timeout(timeout, original))
//! ```
//!
//! The leak detector sits outside the timer guard, so a test that hangs is
//! charged against its timeout rather than retried.

use crate::case::{Fixture, TestFn};
use crate::error::{Error, Result, TestResult};
use crate::guard::wrap_timeout;
use crate::leak::wrap_leak_check;
use crate::policy::{EffectivePolicy, PolicyOverride};
use crate::switch_policy::SwitchExpected;
use std::sync::Arc;
use std::time::Duration;

/// Reserved prefix every test method name starts with.
pub const TEST_PREFIX: &str = "test_";

/// Returns true if `name` may be registered as a test.
#[must_use]
pub fn is_test_name(name: &str) -> bool {
    name == "test" || name.starts_with(TEST_PREFIX)
}

/// Composes the wrappers `policy` asks for around `original`.
#[must_use]
pub fn instrument<S: Fixture>(policy: EffectivePolicy, original: &TestFn<S>) -> TestFn<S> {
    let guarded = wrap_timeout(policy.timeout, Arc::clone(original));
    if policy.leak_check {
        wrap_leak_check(guarded)
    } else {
        guarded
    }
}

struct PendingTest<S> {
    name: String,
    overrides: PolicyOverride,
    original: TestFn<S>,
}

/// Builds a [`Suite`].
pub struct SuiteBuilder<S> {
    file_stem: String,
    class_name: String,
    inherited: EffectivePolicy,
    class: PolicyOverride,
    switch_expected: SwitchExpected,
    tests: Vec<PendingTest<S>>,
}

impl<S: Fixture> SuiteBuilder<S> {
    /// Starts a suite for `class_name` in file `file_stem`.
    #[must_use]
    pub fn new(file_stem: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            file_stem: file_stem.into(),
            class_name: class_name.into(),
            inherited: EffectivePolicy::default(),
            class: PolicyOverride::new(),
            switch_expected: SwitchExpected::Default,
            tests: Vec::new(),
        }
    }

    /// Starts a subclass of `parent`.
    ///
    /// Every parent method is inherited with its own overrides; its policy is
    /// resolved again against this builder's class overrides at build time.
    /// Registering a method with the same name replaces the parent's.
    #[must_use]
    pub fn extend(parent: &Suite<S>, class_name: impl Into<String>) -> Self {
        Self {
            file_stem: parent.file_stem.clone(),
            class_name: class_name.into(),
            inherited: parent.class_policy,
            class: PolicyOverride::new(),
            switch_expected: parent.switch_expected,
            tests: parent
                .tests
                .iter()
                .map(|test| PendingTest {
                    name: test.name.clone(),
                    overrides: test.overrides,
                    original: Arc::clone(&test.original),
                })
                .collect(),
        }
    }

    /// Replaces the inherited defaults.
    #[must_use]
    pub const fn inherit(mut self, policy: EffectivePolicy) -> Self {
        self.inherited = policy;
        self
    }

    /// Sets the file stem used in full names.
    #[must_use]
    pub fn file_stem(mut self, file_stem: impl Into<String>) -> Self {
        self.file_stem = file_stem.into();
        self
    }

    /// Class-level timeout; `None` disables the timer guard.
    #[must_use]
    pub const fn timeout(mut self, after: Option<Duration>) -> Self {
        self.class.timeout = Some(after);
        self
    }

    /// Class-level leak checking.
    #[must_use]
    pub const fn leak_check(mut self, enabled: bool) -> Self {
        self.class.leak_check = Some(enabled);
        self
    }

    /// Class-level switch classification, bypassing the policy lookup.
    #[must_use]
    pub const fn switch_expected(mut self, expected: SwitchExpected) -> Self {
        self.switch_expected = expected;
        self
    }

    /// Registers a test with no method-level overrides.
    #[must_use]
    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut S) -> TestResult + Send + Sync + 'static,
    {
        self.test_with(name, PolicyOverride::new(), body)
    }

    /// Registers a test with method-level overrides.
    #[must_use]
    pub fn test_with<F>(self, name: impl Into<String>, overrides: PolicyOverride, body: F) -> Self
    where
        F: Fn(&mut S) -> TestResult + Send + Sync + 'static,
    {
        self.register(name, overrides, Arc::new(body))
    }

    /// Registers an already shared test body.
    #[must_use]
    pub fn register(
        mut self,
        name: impl Into<String>,
        overrides: PolicyOverride,
        original: TestFn<S>,
    ) -> Self {
        let name = name.into();
        let pending = PendingTest {
            name,
            overrides,
            original,
        };
        match self.tests.iter_mut().find(|t| t.name == pending.name) {
            Some(slot) => *slot = pending,
            None => self.tests.push(pending),
        }
        self
    }

    /// Validates names and instruments every test.
    pub fn build(self) -> Result<Suite<S>> {
        if let Some(bad) = self.tests.iter().find(|t| !is_test_name(&t.name)) {
            return Err(Error::registration(format!(
                "{}.{}: {:?} is not a test name (expected \"test\" or a {TEST_PREFIX:?} prefix)",
                self.file_stem, self.class_name, bad.name
            )));
        }
        let class_policy = self.class.apply(self.inherited);
        let tests = self
            .tests
            .into_iter()
            .map(|pending| {
                let policy = EffectivePolicy::resolve(self.inherited, &self.class, &pending.overrides);
                let wrapped = instrument(policy, &pending.original);
                RegisteredTest {
                    name: pending.name,
                    overrides: pending.overrides,
                    policy,
                    original: pending.original,
                    wrapped,
                }
            })
            .collect::<Vec<_>>();
        tracing::debug!(
            file = %self.file_stem,
            class = %self.class_name,
            tests = tests.len(),
            "suite instrumented"
        );
        Ok(Suite {
            file_stem: self.file_stem,
            class_name: self.class_name,
            class_policy,
            switch_expected: self.switch_expected,
            tests,
        })
    }
}

impl<S> std::fmt::Debug for SuiteBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteBuilder")
            .field("file_stem", &self.file_stem)
            .field("class_name", &self.class_name)
            .field("inherited", &self.inherited)
            .field("class", &self.class)
            .field("tests", &self.tests.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A test after instrumentation.
pub struct RegisteredTest<S> {
    name: String,
    overrides: PolicyOverride,
    policy: EffectivePolicy,
    original: TestFn<S>,
    wrapped: TestFn<S>,
}

impl<S> RegisteredTest<S> {
    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved policy.
    #[must_use]
    pub const fn policy(&self) -> EffectivePolicy {
        self.policy
    }

    /// The method's own overrides.
    #[must_use]
    pub const fn overrides(&self) -> PolicyOverride {
        self.overrides
    }

    /// The body as registered.
    #[must_use]
    pub const fn original(&self) -> &TestFn<S> {
        &self.original
    }

    /// The body with its wrappers.
    #[must_use]
    pub const fn wrapped(&self) -> &TestFn<S> {
        &self.wrapped
    }

    /// Returns true if any wrapper was applied.
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        !Arc::ptr_eq(&self.original, &self.wrapped)
    }

    /// Runs the instrumented body.
    pub fn invoke(&self, fixture: &mut S) -> TestResult {
        (self.wrapped)(fixture)
    }
}

impl<S> std::fmt::Debug for RegisteredTest<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTest")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// An instrumented test class.
pub struct Suite<S> {
    file_stem: String,
    class_name: String,
    class_policy: EffectivePolicy,
    switch_expected: SwitchExpected,
    tests: Vec<RegisteredTest<S>>,
}

impl<S> Suite<S> {
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

    /// The class-level policy subclasses inherit.
    #[must_use]
    pub const fn class_policy(&self) -> EffectivePolicy {
        self.class_policy
    }

    /// The class-level switch classification.
    #[must_use]
    pub const fn switch_expected(&self) -> SwitchExpected {
        self.switch_expected
    }

    /// Registered tests in registration order.
    pub fn tests(&self) -> impl Iterator<Item = &RegisteredTest<S>> {
        self.tests.iter()
    }

    /// Looks a test up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTest<S>> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Number of tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no tests are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl<S> std::fmt::Debug for Suite<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("file_stem", &self.file_stem)
            .field("class_name", &self.class_name)
            .field("class_policy", &self.class_policy)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::TestCase;
    use crate::error::ErrorKind;
    use crate::policy::DEFAULT_TIMEOUT;

    fn pass(_: &mut TestCase) -> TestResult {
        Ok(())
    }

    fn fail(_: &mut TestCase) -> TestResult {
        Err(Error::assertion("child"))
    }

    #[test]
    fn rejects_non_test_names() {
        let err = SuiteBuilder::<TestCase>::new("f", "C")
            .test("helper", pass)
            .build()
            .expect_err("not a test");
        assert_eq!(err.kind(), ErrorKind::Registration);
        assert!(err.to_string().contains("helper"));
    }

    #[test]
    fn accepts_bare_test_and_prefixed_names() {
        let suite = SuiteBuilder::<TestCase>::new("f", "C")
            .test("test", pass)
            .test("test_thing", pass)
            .build()
            .expect("valid");
        assert_eq!(suite.len(), 2);
    }

    #[test]
    fn uninstrumented_test_keeps_original() {
        let suite = SuiteBuilder::<TestCase>::new("f", "C")
            .timeout(None)
            .leak_check(false)
            .test("test_plain", pass)
            .build()
            .expect("valid");
        let test = suite.get("test_plain").expect("registered");
        assert!(!test.is_instrumented());
    }

    #[test]
    fn method_override_beats_class() {
        let suite = SuiteBuilder::<TestCase>::new("f", "C")
            .timeout(Some(Duration::from_millis(20)))
            .test_with("test_slow", PolicyOverride::new().timeout(Duration::from_secs(3)), pass)
            .test("test_fast", pass)
            .build()
            .expect("valid");
        assert_eq!(
            suite.get("test_slow").map(|t| t.policy().timeout),
            Some(Some(Duration::from_secs(3)))
        );
        assert_eq!(
            suite.get("test_fast").map(|t| t.policy().timeout),
            Some(Some(Duration::from_millis(20)))
        );
    }

    #[test]
    fn extend_reresolves_and_replaces() {
        let parent = SuiteBuilder::<TestCase>::new("f", "Parent")
            .leak_check(false)
            .test("test_a", pass)
            .test("test_b", pass)
            .build()
            .expect("valid");
        assert_eq!(parent.class_policy().timeout, Some(DEFAULT_TIMEOUT));

        let child = SuiteBuilder::extend(&parent, "Child")
            .timeout(None)
            .test("test_b", fail)
            .build()
            .expect("valid");
        let a = child.get("test_a").expect("inherited");
        assert_eq!(a.policy().timeout, None);
        assert!(!a.policy().leak_check);
        assert_eq!(child.len(), 2);
        assert!(Arc::ptr_eq(
            child.get("test_a").expect("inherited").original(),
            parent.get("test_a").expect("registered").original()
        ));
        assert!(!Arc::ptr_eq(
            child.get("test_b").expect("replaced").original(),
            parent.get("test_b").expect("registered").original()
        ));
    }
}

//! Timeout and leak-check policy resolution.
//!
//! A test's effective policy is resolved field by field: the method's own
//! override, then its class's override, then whatever the class inherited
//! (ultimately [`EffectivePolicy::default`]).

use std::time::Duration;

/// Timeout applied to every test that does not say otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// The resolved instrumentation for one test method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EffectivePolicy {
    /// Wall-clock limit, or `None` for no timer guard.
    pub timeout: Option<Duration>,
    /// Whether the leak detector wraps the test.
    pub leak_check: bool,
}

impl EffectivePolicy {
    /// Resolves `method` over `class` over `inherited`.
    #[must_use]
    pub fn resolve(inherited: Self, class: &PolicyOverride, method: &PolicyOverride) -> Self {
        method.apply(class.apply(inherited))
    }
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            leak_check: true,
        }
    }
}

/// Optional overrides at one level (class or method).
///
/// Unset fields defer to the level below. `timeout` is doubly optional:
/// `Some(None)` explicitly disables the timer guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    /// Timeout override.
    pub timeout: Option<Option<Duration>>,
    /// Leak-check override.
    pub leak_check: Option<bool>,
}

impl PolicyOverride {
    /// No overrides.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: None,
            leak_check: None,
        }
    }

    /// Overrides the timeout.
    #[must_use]
    pub const fn timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(Some(after));
        self
    }

    /// Disables the timer guard.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    /// Overrides leak checking.
    #[must_use]
    pub const fn leak_check(mut self, enabled: bool) -> Self {
        self.leak_check = Some(enabled);
        self
    }

    /// Applies these overrides on top of `base`.
    #[must_use]
    pub fn apply(&self, base: EffectivePolicy) -> EffectivePolicy {
        EffectivePolicy {
            timeout: self.timeout.unwrap_or(base.timeout),
            leak_check: self.leak_check.unwrap_or(base.leak_check),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides() {
        let policy = EffectivePolicy::resolve(
            EffectivePolicy::default(),
            &PolicyOverride::new(),
            &PolicyOverride::new(),
        );
        assert_eq!(policy.timeout, Some(DEFAULT_TIMEOUT));
        assert!(policy.leak_check);
    }

    #[test]
    fn method_beats_class_beats_inherited() {
        let class = PolicyOverride::new()
            .timeout(Duration::from_millis(50))
            .leak_check(false);
        let method = PolicyOverride::new().no_timeout();
        let policy = EffectivePolicy::resolve(EffectivePolicy::default(), &class, &method);
        assert_eq!(policy.timeout, None);
        assert!(!policy.leak_check);
    }

    #[test]
    fn fields_resolve_independently() {
        let inherited = EffectivePolicy {
            timeout: None,
            leak_check: false,
        };
        let method = PolicyOverride::new().leak_check(true);
        let policy = EffectivePolicy::resolve(inherited, &PolicyOverride::new(), &method);
        assert_eq!(policy.timeout, None);
        assert!(policy.leak_check);
    }
}

//! Expected scheduler-switch classification, looked up by test name.

use core::fmt;
use std::collections::HashMap;

/// Whether a test is expected to yield to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchExpected {
    /// Not resolved yet; the policy lookup replaces it on first run.
    #[default]
    Default,
    /// The test must switch at least once.
    Switch,
    /// The test must not switch at all.
    NoSwitch,
    /// Either outcome is accepted.
    Unspecified,
}

impl SwitchExpected {
    /// Checks a switch delta against this classification.
    ///
    /// `Default` and `Unspecified` accept anything.
    #[must_use]
    pub const fn accepts(self, switches: u64) -> bool {
        match self {
            Self::Switch => switches > 0,
            Self::NoSwitch => switches == 0,
            Self::Default | Self::Unspecified => true,
        }
    }
}

impl fmt::Display for SwitchExpected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Switch => "switch",
            Self::NoSwitch => "no_switch",
            Self::Unspecified => "unspecified",
        })
    }
}

/// Maps a fully-qualified test name (`stem.Class.method`) to its expected
/// switch behaviour.
pub trait SwitchPolicy {
    /// Returns the classification for `fullname`.
    fn expected(&self, fullname: &str) -> SwitchExpected;
}

/// A policy with no opinion: every test is [`SwitchExpected::Unspecified`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSwitchPolicy;

impl SwitchPolicy for NoSwitchPolicy {
    fn expected(&self, _fullname: &str) -> SwitchExpected {
        SwitchExpected::Unspecified
    }
}

/// A table of exact names and dotted prefixes.
///
/// Exact entries win; otherwise the longest prefix that ends on a `.`
/// boundary applies, so `"test__queue"` covers every test in that file.
#[derive(Debug, Clone)]
pub struct SwitchTable {
    exact: HashMap<String, SwitchExpected>,
    prefixes: Vec<(String, SwitchExpected)>,
    fallback: SwitchExpected,
}

impl SwitchTable {
    /// Creates an empty table that answers `Unspecified`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            fallback: SwitchExpected::Unspecified,
        }
    }

    /// Classifies one fully-qualified test.
    #[must_use]
    pub fn exact(mut self, fullname: impl Into<String>, expected: SwitchExpected) -> Self {
        self.exact.insert(fullname.into(), expected);
        self
    }

    /// Classifies every test under a file or class prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>, expected: SwitchExpected) -> Self {
        self.prefixes.push((prefix.into(), expected));
        self
    }

    /// Sets the answer for names no rule covers.
    #[must_use]
    pub const fn fallback(mut self, expected: SwitchExpected) -> Self {
        self.fallback = expected;
        self
    }
}

impl Default for SwitchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchPolicy for SwitchTable {
    fn expected(&self, fullname: &str) -> SwitchExpected {
        if let Some(expected) = self.exact.get(fullname) {
            return *expected;
        }
        self.prefixes
            .iter()
            .filter(|(prefix, _)| {
                fullname
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.fallback, |(_, expected)| *expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_beats_prefix() {
        let table = SwitchTable::new()
            .prefix("test__queue", SwitchExpected::Switch)
            .exact("test__queue.TestQueue.test_empty", SwitchExpected::NoSwitch);
        assert_eq!(
            table.expected("test__queue.TestQueue.test_empty"),
            SwitchExpected::NoSwitch
        );
        assert_eq!(
            table.expected("test__queue.TestQueue.test_put"),
            SwitchExpected::Switch
        );
    }

    #[test]
    fn longest_prefix_wins_on_dot_boundary() {
        let table = SwitchTable::new()
            .prefix("test__queue", SwitchExpected::Switch)
            .prefix("test__queue.TestFast", SwitchExpected::NoSwitch)
            .fallback(SwitchExpected::Default);
        assert_eq!(
            table.expected("test__queue.TestFast.test_a"),
            SwitchExpected::NoSwitch
        );
        assert_eq!(
            table.expected("test__queue2.TestFast.test_a"),
            SwitchExpected::Default
        );
    }

    #[test]
    fn accepts_by_classification() {
        assert!(SwitchExpected::Switch.accepts(2));
        assert!(!SwitchExpected::Switch.accepts(0));
        assert!(SwitchExpected::NoSwitch.accepts(0));
        assert!(!SwitchExpected::NoSwitch.accepts(1));
        assert!(SwitchExpected::Unspecified.accepts(7));
    }

    #[test]
    fn no_switch_policy_has_no_opinion() {
        assert_eq!(NoSwitchPolicy.expected("a.B.test"), SwitchExpected::Unspecified);
    }
}

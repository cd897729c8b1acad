//! Test outcome records and their NDJSON form.
//!
//! Each finished test becomes one [`TestRecord`]; a suite run collects them
//! into a [`SuiteReport`]. Records serialize to one JSON object per line:
//!
//! | Field            | Type      | Description                                  |
//! |------------------|-----------|----------------------------------------------|
//! | `v`              | `u32`     | Schema version ([`REPORT_SCHEMA_VERSION`])   |
//! | `test`           | `string`  | `stem.Class.method`                          |
//! | `status`         | `string`  | `passed`, `failed` or `panicked`             |
//! | `error_kind`     | `string?` | [`ErrorKind`] name on failure                |
//! | `message`        | `string?` | Failure message                              |
//! | `duration_us`    | `u64`     | Wall-clock time including set-up/tear-down   |
//! | `switches`       | `u64?`    | Switches since set-up, if the hub counts     |
//! | `switch_expected`| `string`  | Resolved switch classification               |
//! | `policy`         | `object`  | Resolved timeout and leak-check policy       |

use crate::error::{Error, ErrorKind, TestResult};
use crate::policy::EffectivePolicy;
use crate::switch_policy::SwitchExpected;
use std::time::Duration;

/// Schema version for report lines.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// How a test ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The body and its tear-down returned `Ok`.
    Passed,
    /// The body or its tear-down returned an error.
    Failed,
    /// The body panicked.
    Panicked,
}

/// Outcome of one test.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestRecord {
    /// Schema version.
    pub v: u32,
    /// Fully-qualified test name.
    pub test: String,
    /// Final status.
    pub status: TestStatus,
    /// Kind of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock duration in microseconds.
    pub duration_us: u64,
    /// Switches since set-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switches: Option<u64>,
    /// Resolved switch classification.
    pub switch_expected: SwitchExpected,
    /// Resolved instrumentation policy.
    pub policy: EffectivePolicy,
    #[serde(skip)]
    error: Option<Error>,
}

impl TestRecord {
    /// Builds a record from a test's final result.
    #[must_use]
    pub fn new(
        test: impl Into<String>,
        result: TestResult,
        duration: Duration,
        switches: Option<u64>,
        switch_expected: SwitchExpected,
        policy: EffectivePolicy,
    ) -> Self {
        let (status, error) = match result {
            Ok(()) => (TestStatus::Passed, None),
            Err(err) if err.kind() == ErrorKind::Panicked => (TestStatus::Panicked, Some(err)),
            Err(err) => (TestStatus::Failed, Some(err)),
        };
        Self {
            v: REPORT_SCHEMA_VERSION,
            test: test.into(),
            status,
            error_kind: error.as_ref().map(Error::kind),
            message: error.as_ref().map(ToString::to_string),
            duration_us: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
            switches,
            switch_expected,
            policy,
            error,
        }
    }

    /// Returns true if the test passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// The failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Serializes to one JSON line.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Outcomes of a suite run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    records: Vec<TestRecord>,
}

impl SuiteReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: TestRecord) {
        self.records.push(record);
    }

    /// All records.
    #[must_use]
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Looks a record up by method name or full name.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&TestRecord> {
        self.records.iter().find(|r| {
            r.test == name
                || r.test
                    .rsplit_once('.')
                    .is_some_and(|(_, method)| method == name)
        })
    }

    /// Records of tests that did not pass.
    pub fn failed(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|r| !r.passed())
    }

    /// Returns true if every test passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.records.iter().all(TestRecord::passed)
    }

    /// Fails with every failing test listed, if any failed.
    pub fn assert_all_passed(&self) -> TestResult {
        let failures: Vec<String> = self
            .failed()
            .map(|r| format!("{}: {}", r.test, r.message.as_deref().unwrap_or("failed")))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::assertion(format!(
                "{} of {} tests failed:\n{}",
                failures.len(),
                self.records.len(),
                failures.join("\n")
            )))
        }
    }

    /// All records as NDJSON.
    #[must_use]
    pub fn to_ndjson(&self) -> String {
        let mut output = String::new();
        for record in &self.records {
            output.push_str(&record.to_json_line());
            output.push('\n');
        }
        output
    }
}

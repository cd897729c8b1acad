//! hubtest: test instrumentation for a cooperative, single-threaded hub.
//!
//! # Overview
//!
//! Tests of a cooperative scheduler need more than pass/fail: a test that
//! never yields can hang the whole run, a test that leaks timers or handles
//! corrupts the tests after it, and code running inside the loop reports
//! its failures as diagnostic text rather than return values. hubtest wraps
//! ordinary test bodies with the checks that catch all three.
//!
//! # Core Guarantees
//!
//! - **Bounded tests**: every test runs under a hub timer guard unless it opts out
//! - **Leak detection**: tests are repeated until live resource counts stop growing
//! - **Timer identity**: an inner wait's timeout is never mistaken for the guard's
//! - **Chained diagnostics**: captured text is matched and consumed piece by piece
//! - **Cleanup on every path**: timers, sinks and reclamation are restored by RAII guards
//!
//! # Module Structure
//!
//! - [`hub`]: The hub interface, a reference hub, timeouts and wait primitives
//! - [`guard`]: Timer guard
//! - [`leak`]: Leak detector
//! - [`policy`]: Timeout and leak-check policy resolution
//! - [`suite`]: Suite registration and instrumentation
//! - [`case`]: Per-test state and the fixture seam
//! - [`capture`]: Diagnostic capture and assertions
//! - [`switch_policy`]: Expected switch classification
//! - [`contract`]: Reusable wait/get timeout tests
//! - [`runner`]: Sequential test execution
//! - [`report`]: Outcome records and NDJSON output
//! - [`config`]: Verbosity and debug configuration
//! - [`error`]: Error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

pub mod capture;
pub mod case;
pub mod config;
pub mod contract;
pub mod error;
pub mod guard;
pub mod hub;
pub mod leak;
pub mod policy;
pub mod report;
pub mod runner;
pub mod suite;
pub mod switch_policy;
pub mod test_utils;

pub use capture::{write_diagnostic, MatchTier, StderrCapture};
pub use case::{Fixture, TestCase, TestFn, TestId};
pub use config::HarnessConfig;
pub use error::{Error, ErrorKind, ExpectedError, Result, TestResult};
pub use hub::{CountingHub, Hub, HubError, LocalHub, Timeout};
pub use policy::{EffectivePolicy, PolicyOverride};
pub use report::{SuiteReport, TestRecord, TestStatus};
pub use runner::Harness;
pub use suite::{Suite, SuiteBuilder};
pub use switch_policy::{SwitchExpected, SwitchPolicy, SwitchTable};

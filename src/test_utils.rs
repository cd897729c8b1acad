//! Test utilities for hubtest.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Hub, case and harness constructors with a quiet configuration
//!
//! # Example
//! ```
//! use hubtest::test_utils::{init_test_logging, test_harness};
//!
//! init_test_logging();
//! let harness = test_harness();
//! assert_eq!(harness.hub().switch_count(), Some(0));
//! ```

use crate::case::{TestCase, TestId};
use crate::config::HarnessConfig;
use crate::hub::{CountingHub, Hub, LocalHub};
use crate::policy::EffectivePolicy;
use crate::runner::Harness;
use std::rc::Rc;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Configuration for tests of the harness itself: not verbose, no echo.
#[must_use]
pub const fn quiet_config() -> HarnessConfig {
    HarnessConfig::new()
}

/// A fresh switch-counting hub.
#[must_use]
pub fn test_hub() -> Rc<CountingHub<LocalHub>> {
    Rc::new(CountingHub::new(LocalHub::new()))
}

/// A standalone [`TestCase`] on a fresh counting hub.
#[must_use]
pub fn test_case(method: &str) -> TestCase {
    let hub: Rc<dyn Hub> = test_hub();
    TestCase::new(
        TestId::new("test_utils", "TestCase", method),
        hub,
        EffectivePolicy::default(),
        quiet_config(),
    )
}

/// A harness on a fresh counting hub with [`quiet_config`].
#[must_use]
pub fn test_harness() -> Harness {
    let hub: Rc<dyn Hub> = test_hub();
    Harness::new(hub).with_config(quiet_config())
}

/// Log a test phase header.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

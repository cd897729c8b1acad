//! Reusable timeout-behaviour tests for blocking operations.
//!
//! A fixture implements [`WaitContract`] (the operation returns `None` when
//! its timeout expires, like [`Event::wait`](crate::hub::Event::wait)) or
//! [`GetContract`] (the operation raises the timeout, like
//! [`AsyncResult::get`](crate::hub::AsyncResult::get)), then registers the
//! matching template tests with [`register_wait_contract`] or
//! [`register_get_contract`].
//!
//! ```
//! use hubtest::case::{Fixture, TestCase};
//! use hubtest::contract::{register_wait_contract, WaitContract};
//! use hubtest::hub::{Event, WaitTimeout};
//! use hubtest::suite::SuiteBuilder;
//!
//! struct EventFixture {
//!     case: TestCase,
//!     event: Event,
//! }
//!
//! impl Fixture for EventFixture {
//!     fn case(&self) -> &TestCase { &self.case }
//!     fn case_mut(&mut self) -> &mut TestCase { &mut self.case }
//! }
//!
//! impl WaitContract for EventFixture {
//!     type Output = ();
//!     fn wait(&mut self, timeout: WaitTimeout) -> hubtest::Result<Option<()>> {
//!         Ok(self.event.wait(timeout)?)
//!     }
//! }
//!
//! let suite = register_wait_contract(SuiteBuilder::<EventFixture>::new("test__event", "TestWait"))
//!     .build()
//!     .unwrap();
//! assert_eq!(suite.len(), 2);
//! ```

use crate::case::Fixture;
use crate::error::{Error, ExpectedError, Result, TestResult};
use crate::hub::{SharedError, Timeout, WaitTimeout};
use crate::suite::SuiteBuilder;
use std::fmt::Debug;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timeout passed to the operation in the template tests.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Outer timeout in the "outer timeout is not lost" template.
pub const OUTER_TIMEOUT: Duration = Duration::from_millis(1);

/// Inner timeout in the "outer timeout is not lost" template.
pub const INNER_TIMEOUT: Duration = Duration::from_secs(1);

/// Accepted delay for a wait-style operation to give up.
pub const WAIT_DELAY: Range<Duration> = Duration::from_millis(9)..Duration::from_millis(20);

/// Accepted delay for a get-style operation to raise.
pub const GET_DELAY: Range<Duration> = Duration::from_millis(9)..Duration::from_millis(110);

const NOT_OVERRIDDEN: &str = "override me in subclass";

/// A blocking operation that answers `None` when its timeout expires.
pub trait WaitContract: Fixture {
    /// What a successful wait returns.
    type Output: Debug;

    /// Blocks for at most `timeout`.
    fn wait(&mut self, timeout: WaitTimeout) -> Result<Option<Self::Output>> {
        let _ = timeout;
        Err(Error::not_implemented(NOT_OVERRIDDEN))
    }
}

/// A blocking operation that raises its timeout.
pub trait GetContract: Fixture {
    /// What a successful get returns.
    type Output: Debug;

    /// Blocks for at most `timeout`.
    fn wait(&mut self, timeout: WaitTimeout) -> Result<Self::Output> {
        let _ = timeout;
        Err(Error::not_implemented(NOT_OVERRIDDEN))
    }
}

/// Adds the wait-style templates to `builder`.
#[must_use]
pub fn register_wait_contract<S: WaitContract>(builder: SuiteBuilder<S>) -> SuiteBuilder<S> {
    builder
        .test("test_outer_timeout_is_not_lost", wait_outer_timeout_is_not_lost::<S>)
        .test("test_returns_none_after_timeout", returns_none_after_timeout::<S>)
}

/// Adds the get-style templates to `builder`.
#[must_use]
pub fn register_get_contract<S: GetContract>(builder: SuiteBuilder<S>) -> SuiteBuilder<S> {
    builder
        .test("test_outer_timeout_is_not_lost", get_outer_timeout_is_not_lost::<S>)
        .test("test_raises_timeout_number", raises_timeout_number::<S>)
        .test("test_raises_timeout_timeout", raises_timeout_timeout::<S>)
        .test(
            "test_raises_timeout_timeout_exc_customized",
            raises_timeout_timeout_exc_customized::<S>,
        )
}

fn check_delay(delay: Duration, window: &Range<Duration>) -> TestResult {
    if window.contains(&delay) {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "delay {delay:?} outside [{:?}, {:?})",
            window.start, window.end
        )))
    }
}

fn outer_timeout_is_not_lost<S, T, F>(fixture: &mut S, wait: F) -> TestResult
where
    S: Fixture,
    T: Debug,
    F: FnOnce(&mut S, WaitTimeout) -> Result<T>,
{
    let hub = Rc::clone(fixture.case().hub());
    let timeout = Timeout::start_new(hub, OUTER_TIMEOUT);
    let _cancel = timeout.cancel_on_drop();
    match wait(fixture, WaitTimeout::After(INNER_TIMEOUT)) {
        Err(err) if err.raised_by(&timeout) => Ok(()),
        Err(err) => Err(err),
        Ok(result) => Err(Error::assertion(format!(
            "must raise Timeout (returned {result:?})"
        ))),
    }
}

/// An outer timeout fired during a wait reaches the caller as itself.
pub fn wait_outer_timeout_is_not_lost<S: WaitContract>(fixture: &mut S) -> TestResult {
    outer_timeout_is_not_lost(fixture, <S as WaitContract>::wait)
}

/// An outer timeout fired during a get reaches the caller as itself.
pub fn get_outer_timeout_is_not_lost<S: GetContract>(fixture: &mut S) -> TestResult {
    outer_timeout_is_not_lost(fixture, <S as GetContract>::wait)
}

/// A wait with a short timeout gives up with `None` on time.
pub fn returns_none_after_timeout<S: WaitContract>(fixture: &mut S) -> TestResult {
    let start = Instant::now();
    let result = WaitContract::wait(fixture, WaitTimeout::After(SHORT_TIMEOUT))?;
    check_delay(start.elapsed(), &WAIT_DELAY)?;
    match result {
        None => Ok(()),
        Some(value) => Err(Error::assertion(format!(
            "expected None after timeout, got {value:?}"
        ))),
    }
}

fn expect_raised<S, T, P>(fixture: &mut S, timeout: WaitTimeout, raised: P) -> TestResult
where
    S: GetContract<Output = T>,
    T: Debug,
    P: FnOnce(&Error) -> bool,
{
    let start = Instant::now();
    let err = match GetContract::wait(fixture, timeout) {
        Ok(value) => {
            return Err(Error::assertion(format!(
                "must raise Timeout (returned {value:?})"
            )))
        }
        Err(err) => err,
    };
    let delay = start.elapsed();
    if !raised(&err) {
        return Err(err);
    }
    check_delay(delay, &GET_DELAY)?;
    fixture.cleanup();
    Ok(())
}

/// A get with a numeric timeout raises a timeout on time.
pub fn raises_timeout_number<S: GetContract>(fixture: &mut S) -> TestResult {
    expect_raised(fixture, WaitTimeout::After(SHORT_TIMEOUT), Error::is_timeout)
}

/// A get with a timeout object raises that very timeout.
pub fn raises_timeout_timeout<S: GetContract>(fixture: &mut S) -> TestResult {
    let timeout = Timeout::new(Rc::clone(fixture.case().hub()), Some(SHORT_TIMEOUT));
    expect_raised(fixture, WaitTimeout::Using(timeout.clone()), |err| {
        err.raised_by(&timeout)
    })
}

/// A get with a timeout object carrying a substitute error raises exactly
/// that error.
pub fn raises_timeout_timeout_exc_customized<S: GetContract>(fixture: &mut S) -> TestResult {
    let error: SharedError = Arc::new(ExpectedError::new("expected error"));
    let timeout = Timeout::new(Rc::clone(fixture.case().hub()), Some(SHORT_TIMEOUT))
        .exception(Arc::clone(&error));
    expect_raised(fixture, WaitTimeout::Using(timeout.clone()), |err| {
        !err.is_timeout() && err.raised_by(&timeout)
    })
}

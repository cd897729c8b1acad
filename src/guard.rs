//! Timer guard: bounds a test's wall-clock time.

use crate::case::{Fixture, TestFn};
use crate::hub::Timeout;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Wraps `test` so it is interrupted once `limit` has elapsed.
///
/// With no limit the same `Arc` comes back. Otherwise each invocation arms a
/// fresh hub [`Timeout`]; it fires at the test's next yield point, and the
/// resulting [`Error`](crate::Error) is recognisable through
/// [`Error::raised_by`](crate::Error::raised_by). The timer is cancelled on
/// every exit path, unwinding included.
#[must_use]
pub fn wrap_timeout<S: Fixture>(limit: Option<Duration>, test: TestFn<S>) -> TestFn<S> {
    let Some(limit) = limit else {
        return test;
    };
    Arc::new(move |fixture: &mut S| {
        let hub = Rc::clone(fixture.case().hub());
        let timeout = Timeout::new(hub, Some(limit)).message("test timed out");
        let _guard = timeout.arm();
        let result = test(fixture);
        if let Err(err) = &result {
            if err.raised_by(&timeout) {
                tracing::warn!(
                    test = %fixture.case().id(),
                    limit_ms = limit.as_millis() as u64,
                    "test timed out"
                );
            }
        }
        result
    })
}

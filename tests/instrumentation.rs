//! Instrumentation pipeline: policy resolution, timer guard, leak detector.

mod common;

use common::*;
use hubtest::case::{Fixture, TestCase};
use hubtest::error::{Error, ErrorKind, TestResult};
use hubtest::hub::{sleep, Event, Hub, Timeout};
use hubtest::leak::LEAK_CHECK_ITERATIONS;
use hubtest::policy::{PolicyOverride, DEFAULT_TIMEOUT};
use hubtest::report::TestStatus;
use hubtest::suite::SuiteBuilder;
use hubtest::{test_complete, test_phase, test_section};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn stable_test_converges_in_one_iteration() {
    test_phase!("leak check convergence");
    let (hub, harness) = counting_harness();
    let shared = Shared::default();
    let suite = SuiteBuilder::<HandleFixture>::new("instrumentation", "TestLeaks")
        .test("test_scratch_only", |f: &mut HandleFixture| -> TestResult {
            f.open_scratch();
            sleep(&**f.case().hub(), Duration::from_millis(1))?;
            Ok(())
        })
        .build()
        .expect("valid suite");

    let report = harness.run_suite(&suite, HandleFixture::factory(&hub, &shared));
    report.assert_all_passed().expect("no growth");
    assert_eq!(hub.inner().pending_timers(), 0);
    test_complete!("stable_test_converges_in_one_iteration");
}

#[test]
fn growing_test_fails_with_every_delta() {
    test_phase!("leak check growth");
    let (hub, harness) = counting_harness();
    let shared = Shared::default();
    let suite = SuiteBuilder::<HandleFixture>::new("instrumentation", "TestLeaks")
        .test("test_leaks_one_handle", |f: &mut HandleFixture| -> TestResult {
            f.leak();
            Ok(())
        })
        .build()
        .expect("valid suite");

    let record = harness
        .run_test(&suite, "test_leaks_one_handle", HandleFixture::factory(&hub, &shared))
        .expect("registered");
    assert_eq!(record.status, TestStatus::Failed);
    let err = record.error().expect("failure recorded");
    assert_eq!(err.kind(), ErrorKind::ResourceGrowth);
    assert_eq!(err.deltas(), Some(&[1, 1, 1, 1][..]));
    assert_eq!(shared.kept.borrow().len(), LEAK_CHECK_ITERATIONS);
    test_complete!("growing_test_fails_with_every_delta", deltas = "[1, 1, 1, 1]");
}

#[test]
fn cleanup_runs_after_every_iteration_and_at_tear_down() {
    let (hub, harness) = counting_harness();
    let shared = Shared::default();
    let suite = SuiteBuilder::<HandleFixture>::new("instrumentation", "TestLeaks")
        .test("test_warm_up", |f: &mut HandleFixture| -> TestResult {
            if f.leaked() < 2 {
                f.leak();
            }
            Ok(())
        })
        .build()
        .expect("valid suite");

    let record = harness
        .run_test(&suite, "test_warm_up", HandleFixture::factory(&hub, &shared))
        .expect("registered");
    assert!(record.passed(), "{:?}", record.error());
    assert_eq!(shared.kept.borrow().len(), 2);
    // three leak-check iterations plus tear-down
    assert_eq!(shared.cleanups.get(), 4);
}

#[test]
fn leak_check_disabled_runs_once() {
    let (hub, harness) = counting_harness();
    let shared = Shared::default();
    let suite = SuiteBuilder::<HandleFixture>::new("instrumentation", "TestNoLeakCheck")
        .leak_check(false)
        .test("test_leaks_one_handle", |f: &mut HandleFixture| -> TestResult {
            f.leak();
            Ok(())
        })
        .build()
        .expect("valid suite");
    let report = harness.run_suite(&suite, HandleFixture::factory(&hub, &shared));
    report.assert_all_passed().expect("unchecked");
    assert_eq!(shared.kept.borrow().len(), 1);
}

#[test]
fn guard_interrupts_a_hanging_test_with_its_own_identity() {
    test_phase!("timer guard");
    let (_hub, harness) = counting_harness();
    let suite = SuiteBuilder::<EventFixture>::new("instrumentation", "TestGuard")
        .timeout(Some(Duration::from_millis(20)))
        .leak_check(false)
        .test("test_hangs", |f: &mut EventFixture| -> TestResult {
            f.event.wait(None::<Duration>)?;
            Ok(())
        })
        .test("test_inner_timeout_absorbed", |f: &mut EventFixture| -> TestResult {
            let result = f.event.wait(Duration::from_millis(2))?;
            assert_eq!(result, None);
            Ok(())
        })
        .build()
        .expect("valid suite");

    let report = harness.run_suite(&suite, EventFixture::new);
    let hang = report.record("test_hangs").expect("ran");
    let err = hang.error().expect("timed out");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.to_string().contains("test timed out"));
    assert!(report.record("test_inner_timeout_absorbed").is_some_and(|r| r.passed()));
    test_complete!("guard_interrupts_a_hanging_test_with_its_own_identity");
}

#[test]
fn hang_is_charged_to_the_timeout_not_retried() {
    let (hub, harness) = counting_harness();
    let suite = SuiteBuilder::<EventFixture>::new("instrumentation", "TestGuard")
        .timeout(Some(Duration::from_millis(10)))
        .test("test_hangs", |f: &mut EventFixture| -> TestResult {
            f.event.wait(None::<Duration>)?;
            Ok(())
        })
        .build()
        .expect("valid suite");
    let before = hub.count();
    let record = harness
        .run_test(&suite, "test_hangs", EventFixture::new)
        .expect("registered");
    assert_eq!(record.error().map(Error::kind), Some(ErrorKind::Timeout));
    assert_eq!(hub.count() - before, 1);
    assert_eq!(hub.inner().pending_timers(), 0);
}

#[test]
fn panicking_test_still_cancels_timers_and_restores_reclaim() {
    let (hub, harness) = counting_harness();
    let suite = SuiteBuilder::<EventFixture>::new("instrumentation", "TestPanic")
        .test("test_panics_mid_wait", |f: &mut EventFixture| -> TestResult {
            let hub = Rc::clone(f.case().hub());
            let _outer = Timeout::start_new(hub, Duration::from_secs(5)).cancel_on_drop();
            f.event.wait(Duration::from_millis(1))?;
            panic!("panicked after waiting");
        })
        .build()
        .expect("valid suite");
    let record = harness
        .run_test(&suite, "test_panics_mid_wait", EventFixture::new)
        .expect("registered");
    assert_eq!(record.status, TestStatus::Panicked);
    assert_eq!(hub.inner().pending_timers(), 0);
    assert!(hub.inner().background_reclaim());
}

#[test]
fn policy_resolves_method_class_inherited() {
    test_section!("policy resolution");
    let parent = SuiteBuilder::<TestCase>::new("instrumentation", "TestParent")
        .timeout(Some(Duration::from_millis(300)))
        .test("test_a", |_: &mut TestCase| -> TestResult { Ok(()) })
        .test_with(
            "test_b",
            PolicyOverride::new().leak_check(false),
            |_: &mut TestCase| -> TestResult { Ok(()) },
        )
        .build()
        .expect("valid suite");
    let a = parent.get("test_a").expect("registered").policy();
    assert_eq!(a.timeout, Some(Duration::from_millis(300)));
    assert!(a.leak_check);

    let child = SuiteBuilder::extend(&parent, "TestChild")
        .leak_check(false)
        .test("test_c", |_: &mut TestCase| -> TestResult { Ok(()) })
        .build()
        .expect("valid suite");
    let a = child.get("test_a").expect("inherited").policy();
    assert_eq!(a.timeout, Some(Duration::from_millis(300)));
    assert!(!a.leak_check);
    let c = child.get("test_c").expect("registered").policy();
    assert_eq!(c.timeout, Some(Duration::from_millis(300)));

    let fresh = SuiteBuilder::<TestCase>::new("instrumentation", "TestFresh")
        .test("test", |_: &mut TestCase| -> TestResult { Ok(()) })
        .build()
        .expect("valid suite");
    assert_eq!(
        fresh.get("test").expect("registered").policy().timeout,
        Some(DEFAULT_TIMEOUT)
    );
}

#[test]
fn switch_counter_tracks_yields() {
    let (hub, _harness) = counting_harness();
    let dyn_hub: Rc<dyn Hub> = Rc::clone(&hub) as Rc<dyn Hub>;
    let event = Event::new(Rc::clone(&dyn_hub));
    assert_eq!(hub.count(), 0);
    sleep(&*dyn_hub, Duration::from_millis(1)).expect("slept");
    assert_eq!(event.wait(Duration::from_millis(1)).expect("waited"), None);
    assert_eq!(hub.count(), 2);
    assert_eq!(dyn_hub.switch_count(), Some(2));
}

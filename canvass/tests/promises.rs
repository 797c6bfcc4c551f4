//! Settlement-semantics suite for the promise engine: ordering, exactly-once
//! delivery, chain adoption, and error propagation, all under a paused clock.

use canvass::{Produced, Promise, PromiseError, Scheduler, Step};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn record(log: &Rc<RefCell<Vec<String>>>, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn noop_produced<T>(value: T) -> Produced<T> {
    Ok(Step::Value(value))
}

#[tokio::test(start_paused = true)]
async fn test_reactions_fire_in_attachment_order() {
    let scheduler = Scheduler::new();
    let promise: Promise<i32> = Promise::new(&scheduler);
    let log = Rc::new(RefCell::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let log = Rc::clone(&log);
        promise.then(move |value| {
            record(&log, format!("{label}:{value}"));
            noop_produced(())
        });
    }

    promise.resolve(7);
    scheduler.run_until_idle().await;

    assert_eq!(*log.borrow(), vec!["first:7", "second:7", "third:7"]);
}

#[tokio::test(start_paused = true)]
async fn test_handler_runs_even_when_attached_after_settlement() {
    let scheduler = Scheduler::new();
    let promise: Promise<&'static str> = Promise::new(&scheduler);

    promise.resolve("done");
    scheduler.run_until_idle().await;

    let log = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&log);
    promise.then(move |value| {
        record(&seen, value);
        noop_produced(())
    });

    // Attachment alone must not run the handler.
    assert!(log.borrow().is_empty());
    scheduler.run_until_idle().await;
    assert_eq!(*log.borrow(), vec!["done"]);
}

#[tokio::test(start_paused = true)]
async fn test_settlement_is_exactly_once() {
    let scheduler = Scheduler::new();
    let promise: Promise<i32> = Promise::new(&scheduler);
    let calls = Rc::new(RefCell::new(0));

    let counter = Rc::clone(&calls);
    promise.then(move |_| {
        *counter.borrow_mut() += 1;
        noop_produced(())
    });

    promise.resolve(1);
    promise.resolve(2);
    promise.reject(PromiseError::rejected("too late"));
    scheduler.run_until_idle().await;

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(promise.outcome(), Some(Ok(1)));
}

#[tokio::test(start_paused = true)]
async fn test_resolving_with_promise_locks_in_that_promise() {
    let scheduler = Scheduler::new();
    let inner: Promise<i32> = Promise::new(&scheduler);
    let outer: Promise<i32> = Promise::new(&scheduler);

    outer.resolve(inner.clone());
    // Direct resolution after lock-in must be ignored.
    outer.resolve(99);
    scheduler.run_until_idle().await;
    assert!(outer.is_pending());

    inner.resolve(42);
    scheduler.run_until_idle().await;
    assert_eq!(outer.outcome(), Some(Ok(42)));
}

#[tokio::test(start_paused = true)]
async fn test_chain_adopts_returned_promise() {
    let scheduler = Scheduler::new();
    let first: Promise<i32> = Promise::new(&scheduler);
    let second: Promise<i32> = Promise::new(&scheduler);

    let chained = first.then(move |_| Ok::<_, PromiseError>(Step::Pending(second.clone())));
    first.resolve(1);
    scheduler.run_until_idle().await;

    // The chain waits on the adopted promise.
    assert!(chained.is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_chain_flattens_through_adoption() {
    let scheduler = Scheduler::new();
    let first: Promise<i32> = Promise::new(&scheduler);
    let second: Promise<i32> = Promise::new(&scheduler);

    let seconds = second.clone();
    let chained = first.then(move |_| Ok::<_, PromiseError>(Step::Pending(seconds)));

    first.resolve(1);
    second.resolve(10);
    scheduler.run_until_idle().await;

    assert_eq!(chained.outcome(), Some(Ok(10)));
}

#[tokio::test(start_paused = true)]
async fn test_rejection_skips_fulfillment_handlers() {
    let scheduler = Scheduler::new();
    let promise: Promise<i32> = Promise::new(&scheduler);
    let log = Rc::new(RefCell::new(Vec::new()));

    let seen = Rc::clone(&log);
    let recovered = promise
        .then(move |_| {
            record(&seen, "fulfilled");
            noop_produced(0)
        })
        .then(|value| noop_produced(value + 1))
        .or_else(|error| {
            assert!(matches!(error, PromiseError::Rejected(_)));
            noop_produced(-1)
        });

    promise.reject(PromiseError::rejected("nope"));
    scheduler.run_until_idle().await;

    assert!(log.borrow().is_empty());
    assert_eq!(recovered.outcome(), Some(Ok(-1)));
}

#[tokio::test(start_paused = true)]
async fn test_handler_error_rejects_the_chain() {
    let scheduler = Scheduler::new();
    let promise: Promise<i32> = Promise::new(&scheduler);

    let chained = promise
        .then(|_| Err::<Step<i32>, _>(PromiseError::handler("boom")))
        .then(|value| noop_produced(value));

    promise.resolve(1);
    scheduler.run_until_idle().await;

    assert_eq!(
        chained.outcome(),
        Some(Err(PromiseError::Handler("boom".into())))
    );
}

#[tokio::test(start_paused = true)]
async fn test_then_or_else_picks_one_arm() {
    let scheduler = Scheduler::new();
    let fulfilled: Promise<i32> = Promise::new(&scheduler);
    let rejected: Promise<i32> = Promise::new(&scheduler);

    let from_value = fulfilled.then_or_else(|value| noop_produced(value * 2), |_| noop_produced(0));
    let from_error = rejected.then_or_else(|value| noop_produced(value * 2), |_| noop_produced(-1));

    fulfilled.resolve(21);
    rejected.reject(PromiseError::rejected("down"));
    scheduler.run_until_idle().await;

    assert_eq!(from_value.outcome(), Some(Ok(42)));
    assert_eq!(from_error.outcome(), Some(Ok(-1)));
}

#[tokio::test(start_paused = true)]
async fn test_deferred_work_interleaves_with_timers() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let scheduler = Scheduler::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let seen = Rc::clone(&log);
    scheduler.schedule(Duration::from_millis(50), move || {
        record(&seen, "timer");
    });

    let seen = Rc::clone(&log);
    scheduler
        .defer(|| noop_produced("deferred"))
        .then(move |value| {
            record(&seen, value);
            noop_produced(())
        });

    scheduler.run_until_idle().await;

    // Immediate deferrals run before the 50ms timer.
    assert_eq!(*log.borrow(), vec!["deferred", "timer"]);
}

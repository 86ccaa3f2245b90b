//! End-to-end flows through the public surface: leaves, combinators,
//! promises and the blocking waiter together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskflow::{
    block_on, failure, join, join_with, race, start, success, timeout, Promise, TaskError,
};

#[test]
fn test_timeout_delivers_the_value_eventually() {
    let failed = Arc::new(AtomicBool::new(false));
    let (tx, rx) = std::sync::mpsc::channel();
    let probe = failed.clone();
    timeout(Duration::ZERO, 42).run(
        move |v| {
            let _ = tx.send(v);
        },
        move |_e| probe.store(true, Ordering::SeqCst),
    );
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(42));
    assert!(!failed.load(Ordering::SeqCst));
}

#[test]
fn test_success_delivers_synchronously() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    success(42).run(
        move |v| {
            *slot.lock().unwrap() = Some(v);
        },
        |_e| {},
    );
    // no waiting: the value is there before run() returned
    assert_eq!(*seen.lock().unwrap(), Some(42));
}

#[test]
fn test_join_multiplies_parallel_results() {
    let task = join_with(
        |values: Vec<i32>| values.iter().product::<i32>(),
        vec![success(6), success(7)],
    );
    assert_eq!(block_on(&task), Ok(42));
}

#[test]
fn test_join_fails_when_any_child_fails() {
    let succeeded = Arc::new(AtomicBool::new(false));
    let task = join(vec![success(6), failure("sad trombone")]);

    let probe = succeeded.clone();
    let (tx, rx) = std::sync::mpsc::channel();
    task.run(
        move |_v| probe.store(true, Ordering::SeqCst),
        move |e| {
            let _ = tx.send(e);
        },
    );

    let fault = rx.recv_timeout(Duration::from_secs(2)).expect("no failure");
    assert_eq!(fault, TaskError::fail("sad trombone"));
    assert!(!succeeded.load(Ordering::SeqCst));
}

#[test]
fn test_race_prefers_the_faster_competitor() {
    let started = Instant::now();
    let task = race(vec![
        timeout(Duration::from_millis(10), "turtle"),
        timeout(Duration::from_millis(500), "rabbit"),
    ]);
    assert_eq!(block_on(&task), Ok("turtle"));
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_then_feeds_the_success_forward() {
    let task = success(6).then(|x| success(x * (x + 1)));
    assert_eq!(block_on(&task), Ok(42));
}

#[test]
fn test_or_else_turns_the_failure_into_a_value() {
    let task = failure::<String>("original").or_else(|e| success(e.to_string()));
    assert_eq!(block_on(&task), Ok("execution failed: original".to_string()));
}

#[test]
fn test_promise_cancel_is_per_subscriber() {
    let promise = Promise::new();

    let first = Arc::new(Mutex::new(None));
    let slot = first.clone();
    let cancel_first = promise.subscribe(
        |_v: i32| {},
        move |e| {
            *slot.lock().unwrap() = Some(e);
        },
    );

    let second = Arc::new(Mutex::new(None));
    let slot = second.clone();
    promise.subscribe(
        move |v| {
            *slot.lock().unwrap() = Some(v);
        },
        |_e| {},
    );

    cancel_first.cancel();
    assert_eq!(first.lock().unwrap().take(), Some(TaskError::Canceled));

    promise.complete(&success(7));
    assert_eq!(second.lock().unwrap().take(), Some(7));
}

#[test]
fn test_start_memoizes_across_subscribers() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counted = calls.clone();
    let task = start(&taskflow::effect(move || {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(99)
    }));

    assert_eq!(block_on(&task), Ok(99));
    assert_eq!(block_on(&task), Ok(99));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_nested_combinators_compose() {
    let task = race(vec![
        timeout(Duration::from_millis(80), 0),
        join_with(
            |values: Vec<i32>| values.iter().sum::<i32>(),
            vec![success(40), timeout(Duration::from_millis(5), 2)],
        )
        .then(|sum| success(sum)),
    ]);
    assert_eq!(block_on(&task), Ok(42));
}

//! # Leaf tasks: the suspension points everything else composes.
//!
//! - [`success`] / [`failure`] deliver synchronously from the starting
//!   call.
//! - [`effect`] / [`effect_blocking`] run a closure on an executor pool
//!   and deliver its outcome; panics in the body are routed into the
//!   failure channel.
//! - [`timeout`] delivers a value after a delay via the scheduler.
//!
//! Combinators never suspend themselves; only leaves (and author-written
//! tasks) make a continuation fire later.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TaskError;
use crate::rig::{default_rig, Executor, Scheduler};
use crate::task::{Canceller, Outcome, Sink, Task};

/// A task that synchronously succeeds with `value` on every run.
///
/// Constructing it performs no work; each run clones the value out.
/// The value sits behind a mutex held only while cloning, which keeps the
/// task shareable without demanding `T: Sync`.
pub fn success<T>(value: T) -> Task<T>
where
    T: Clone + Send + 'static,
{
    let value = Mutex::new(value);
    Task::new(move |sink| {
        let snapshot = value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        sink.succeed(snapshot);
        Canceller::noop()
    })
}

/// A task that synchronously fails with `fault` on every run.
pub fn failure<T>(fault: impl Into<TaskError>) -> Task<T>
where
    T: Send + 'static,
{
    let fault = fault.into();
    Task::new(move |sink| {
        sink.fail(fault.clone());
        Canceller::noop()
    })
}

/// Runs `body` on the default compute pool; see [`effect_via`].
pub fn effect<T, F>(body: F) -> Task<T>
where
    T: Send + 'static,
    F: Fn() -> Outcome<T> + Send + Sync + 'static,
{
    effect_via(default_rig(), body)
}

/// Runs `body` on the given executor's compute pool.
///
/// A panic in `body` is caught and delivered as [`TaskError::Panicked`].
/// A panic raised by the success continuation itself is also caught and
/// converted into a single `Panicked` failure delivery; the failure arm
/// runs at most once per execution either way. Cancellation is a no-op:
/// the work may already be queued or running.
pub fn effect_via<T, F>(exec: Arc<dyn Executor>, body: F) -> Task<T>
where
    T: Send + 'static,
    F: Fn() -> Outcome<T> + Send + Sync + 'static,
{
    let body = Arc::new(body);
    Task::new(move |sink| {
        let body = body.clone();
        exec.submit(Box::new(move || deliver_body(&*body, sink)));
        Canceller::noop()
    })
}

/// Like [`effect`], but on the unbounded pool intended for blocking work.
pub fn effect_blocking<T, F>(body: F) -> Task<T>
where
    T: Send + 'static,
    F: Fn() -> Outcome<T> + Send + Sync + 'static,
{
    effect_blocking_via(default_rig(), body)
}

/// Like [`effect_via`], but submitted with
/// [`Executor::submit_blocking`].
pub fn effect_blocking_via<T, F>(exec: Arc<dyn Executor>, body: F) -> Task<T>
where
    T: Send + 'static,
    F: Fn() -> Outcome<T> + Send + Sync + 'static,
{
    let body = Arc::new(body);
    Task::new(move |sink| {
        let body = body.clone();
        exec.submit_blocking(Box::new(move || deliver_body(&*body, sink)));
        Canceller::noop()
    })
}

fn deliver_body<T: Send + 'static>(body: &(dyn Fn() -> Outcome<T> + Send + Sync), sink: Sink<T>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));
    // continuations run guarded too; a panicking one must not vanish
    // into the executor
    sink.settle_caught(outcome);
}

/// A task that succeeds with `value` after `delay`, via the default
/// scheduler; see [`timeout_via`].
pub fn timeout<T>(delay: Duration, value: T) -> Task<T>
where
    T: Clone + Send + 'static,
{
    timeout_via(default_rig(), delay, value)
}

/// A task that succeeds with `value` after `delay` on the given
/// scheduler. Its canceller drops the pending timer; once canceled the
/// continuation never fires.
pub fn timeout_via<T>(sched: Arc<dyn Scheduler>, delay: Duration, value: T) -> Task<T>
where
    T: Clone + Send + 'static,
{
    let value = Mutex::new(value);
    Task::new(move |sink| {
        let snapshot = value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        sched.schedule(delay, Box::new(move || sink.succeed(snapshot)))
    })
}

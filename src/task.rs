//! # The task contract: one-shot computations as plain values.
//!
//! A [`Task`] is a *description* of a computation. Nothing runs until the
//! task is handed a continuation; running it again starts a fresh,
//! independent execution. The universal shape is
//!
//! ```text
//!   run(on_success, on_failure) -> Canceller
//! ```
//!
//! - [`Sink`] bundles the two continuations into a single one-shot
//!   delivery handle. Its methods consume `self`, so a task execution can
//!   deliver **at most one** result, checked by the compiler.
//! - [`Canceller`] requests cooperative termination. It is cloneable,
//!   thread-safe and idempotent: the hook runs on the first call, every
//!   later call is a no-op.
//!
//! Task authors must not block the starting call and must not panic out
//! of it; the built-in leaves and combinators route panics into the
//! failure channel instead.
//!
//! # Example
//! ```no_run
//! use taskflow::{success, Task};
//!
//! let doubled: Task<i32> = success(21).then(|n| success(n * 2));
//! let cancel = doubled.run(|v| println!("got {v}"), |e| eprintln!("failed: {e}"));
//! cancel.cancel();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::error::TaskError;

/// The single terminal result of one task execution.
pub type Outcome<T> = Result<T, TaskError>;

/// The two continuation arms are kept apart so the engine can still reach
/// the failure arm after a success arm that panicked ([`Sink::settle_caught`]).
enum Deliver<T> {
    Split(
        Box<dyn FnOnce(T) + Send>,
        Box<dyn FnOnce(TaskError) + Send>,
    ),
    Fused(Box<dyn FnOnce(Outcome<T>) + Send>),
}

/// # One-shot delivery handle for a task's result.
///
/// Built from a success/failure continuation pair ([`Sink::new`]) or a
/// single outcome callback ([`Sink::from_fn`]). Delivery methods consume
/// the sink: once a result went out, the other arm is unreachable.
///
/// Dropping a sink without delivering is allowed; it means this execution
/// will never complete (e.g. it was canceled before producing a result).
pub struct Sink<T> {
    deliver: Deliver<T>,
}

impl<T: Send + 'static> Sink<T> {
    /// Builds a sink from the classic continuation pair.
    pub fn new(
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(TaskError) + Send + 'static,
    ) -> Self {
        Self {
            deliver: Deliver::Split(Box::new(on_success), Box::new(on_failure)),
        }
    }

    /// Builds a sink from a single outcome callback.
    pub fn from_fn(deliver: impl FnOnce(Outcome<T>) + Send + 'static) -> Self {
        Self {
            deliver: Deliver::Fused(Box::new(deliver)),
        }
    }

    /// Delivers the success value.
    pub fn succeed(self, value: T) {
        match self.deliver {
            Deliver::Split(on_success, _on_failure) => on_success(value),
            Deliver::Fused(deliver) => deliver(Ok(value)),
        }
    }

    /// Delivers the failure.
    pub fn fail(self, fault: TaskError) {
        match self.deliver {
            Deliver::Split(_on_success, on_failure) => on_failure(fault),
            Deliver::Fused(deliver) => deliver(Err(fault)),
        }
    }

    /// Delivers an already-assembled outcome.
    pub fn settle(self, outcome: Outcome<T>) {
        match outcome {
            Ok(value) => self.succeed(value),
            Err(fault) => self.fail(fault),
        }
    }

    /// Delivery with the continuations themselves under a panic guard.
    ///
    /// A success continuation that panics is converted into exactly one
    /// failure delivery carrying [`TaskError::Panicked`]. A failure
    /// continuation that panics is caught and dropped — there is nobody
    /// left to notify. Used by the pool-backed leaves, whose continuations
    /// would otherwise unwind into the executor and vanish.
    pub(crate) fn settle_caught(self, outcome: Outcome<T>) {
        match (self.deliver, outcome) {
            (Deliver::Split(on_success, on_failure), Ok(value)) => {
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(move || on_success(value)))
                {
                    let fault = TaskError::from_panic(payload);
                    if panic::catch_unwind(AssertUnwindSafe(move || on_failure(fault))).is_err() {
                        tracing::error!("failure continuation panicked; contract violation");
                    }
                }
            }
            (Deliver::Split(_on_success, on_failure), Err(fault)) => {
                if panic::catch_unwind(AssertUnwindSafe(move || on_failure(fault))).is_err() {
                    tracing::error!("failure continuation panicked; contract violation");
                }
            }
            (Deliver::Fused(deliver), outcome) => {
                if panic::catch_unwind(AssertUnwindSafe(move || deliver(outcome))).is_err() {
                    tracing::error!("outcome continuation panicked; contract violation");
                }
            }
        }
    }
}

/// # Cooperative cancellation handle.
///
/// The hook is taken out of its slot on the first call and invoked outside
/// the lock, so cancellers are safe to call from any thread and
/// re-entrantly from within a continuation. Calls after the first (or on a
/// [`Canceller::noop`]) do nothing.
#[derive(Clone)]
pub struct Canceller {
    hook: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Canceller {
    /// Wraps a cancellation hook. The hook runs at most once.
    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Arc::new(Mutex::new(Some(Box::new(hook)))),
        }
    }

    /// A canceller with no effect, for tasks that complete synchronously
    /// or cannot be interrupted.
    pub fn noop() -> Self {
        Self {
            hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Requests cooperative termination.
    pub fn cancel(&self) {
        let hook = match self.hook.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// # A deferred, re-runnable, cancelable computation.
///
/// `Task<T>` is a cheap handle (`Clone` shares the description, not any
/// execution). Each [`run`](Task::run) starts an independent execution
/// that delivers exactly one [`Outcome`] and returns a [`Canceller`] for
/// it.
pub struct Task<T> {
    start: Arc<dyn Fn(Sink<T>) -> Canceller + Send + Sync>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            start: self.start.clone(),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Wraps a start function into a task.
    ///
    /// The function is invoked once per execution. It must wire the sink
    /// into whatever will eventually deliver, return quickly, and not
    /// panic.
    pub fn new(start: impl Fn(Sink<T>) -> Canceller + Send + Sync + 'static) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Starts one execution with a continuation pair.
    pub fn run(
        &self,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(TaskError) + Send + 'static,
    ) -> Canceller {
        self.run_sink(Sink::new(on_success, on_failure))
    }

    /// Starts one execution delivering into the given sink.
    pub fn run_sink(&self, sink: Sink<T>) -> Canceller {
        (self.start)(sink)
    }

    /// Bridges this task into the async world: starts one execution and
    /// resolves when it delivers.
    ///
    /// Dropping the returned future abandons the execution without
    /// cancelling it; keep the task's canceller if you need to interrupt.
    /// If the execution drops its continuation without delivering, the
    /// future resolves to [`TaskError::Canceled`].
    pub async fn wait(&self) -> Outcome<T> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _running = self.run_sink(Sink::from_fn(move |outcome| {
            let _ = tx.send(outcome);
        }));
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Canceled),
        }
    }
}

//! # Eager start and blocking wait.
//!
//! [`start`] runs a task immediately and memoizes its outcome behind a
//! [`Promise`]; [`block_on`] parks the calling thread until a task
//! delivers. Everything else in the crate is non-blocking by contract.

use tokio::runtime::Handle;

use crate::error::TaskError;
use crate::promise::Promise;
use crate::task::{Outcome, Sink, Task};

/// Starts `task` now and returns a task sharing its single execution.
///
/// The returned task forwards every run to the underlying promise:
/// subscribers before completion wait, subscribers after completion get
/// the memoized outcome immediately. Cancelling a subscriber withdraws
/// that subscriber only; the eager execution keeps running.
pub fn start<T>(task: &Task<T>) -> Task<T>
where
    T: Clone + Send + 'static,
{
    let promise = Promise::new();
    promise.complete(task);
    promise.as_task()
}

/// Runs `task` and parks the calling thread until it delivers.
///
/// Refuses with [`TaskError::BlockUnsupported`] when called from inside
/// an async runtime worker, where parking would stall the executor. If
/// the execution drops its continuation without delivering (for example
/// it was canceled), the wait ends with [`TaskError::Canceled`] instead
/// of hanging.
pub fn block_on<T>(task: &Task<T>) -> Outcome<T>
where
    T: Send + 'static,
{
    if Handle::try_current().is_ok() {
        tracing::warn!("block_on called from an async context, refusing to park");
        return Err(TaskError::BlockUnsupported);
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    let _running = task.run_sink(Sink::from_fn(move |outcome| {
        let _ = tx.send(outcome);
    }));
    match rx.blocking_recv() {
        Ok(outcome) => outcome,
        Err(_) => Err(TaskError::Canceled),
    }
}

//! # Completable, memoized tasks with multi-subscriber broadcast.
//!
//! A [`Promise`] is both a task (subscribe with continuations, get a
//! per-subscriber canceller) and a completer (feed it a task once; the
//! first terminal outcome is memoized and broadcast).
//!
//! Delivery ownership is the key invariant: a pending subscriber lives as
//! an entry in a concurrent map, and **whoever removes the entry delivers
//! to it** — the broadcast on completion, the subscriber's own canceller,
//! or the subscribing call that lost the insert/close race. Exactly one
//! of them can win the removal, so every subscriber observes exactly one
//! continuation call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::TaskError;
use crate::task::{Canceller, Outcome, Sink, Task};

/// # A completable, memoized task handle.
///
/// Cloning shares the underlying cell. Subscribers before completion wait;
/// subscribers after completion get the memoized outcome immediately.
/// Cancelling one subscriber delivers a synthetic
/// [`TaskError::Canceled`] to that subscriber only — the underlying task
/// and every other subscriber are unaffected.
pub struct Promise<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

struct Cell<T> {
    /// Pending sinks, each behind a mutex touched only when the entry is
    /// removed (a sink alone would keep the map from being shared).
    subscribers: DashMap<u64, Mutex<Option<Sink<T>>>>,
    next_key: AtomicU64,
    /// First-completion latch; later completions are dropped.
    sealed: AtomicBool,
    /// Set after `memo` is readable.
    closed: AtomicBool,
    memo: Mutex<Option<Outcome<T>>>,
}

fn take_sink<T>(slot: Mutex<Option<Sink<T>>>) -> Option<Sink<T>> {
    slot.into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> Cell<T> {
    fn memoized(&self) -> Outcome<T> {
        self.memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or(Err(TaskError::Canceled))
    }

    fn subscribe(cell: &Arc<Self>, sink: Sink<T>) -> Canceller {
        if cell.closed.load(Ordering::Acquire) {
            sink.settle(cell.memoized());
            return Canceller::noop();
        }

        let key = cell.next_key.fetch_add(1, Ordering::Relaxed);
        cell.subscribers.insert(key, Mutex::new(Some(sink)));

        if cell.closed.load(Ordering::Acquire) {
            // completion raced the insert; deliver iff the broadcast missed us
            if let Some((_, slot)) = cell.subscribers.remove(&key) {
                if let Some(sink) = take_sink(slot) {
                    sink.settle(cell.memoized());
                }
            }
            return Canceller::noop();
        }

        let cell = cell.clone();
        Canceller::new(move || {
            if let Some((_, slot)) = cell.subscribers.remove(&key) {
                if let Some(sink) = take_sink(slot) {
                    if cell.closed.load(Ordering::Acquire) {
                        sink.settle(cell.memoized());
                    } else {
                        sink.fail(TaskError::Canceled);
                    }
                }
            }
        })
    }

    fn close(&self, outcome: Outcome<T>) {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self
            .memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome);
        self.closed.store(true, Ordering::Release);
        tracing::trace!("promise closed, broadcasting");

        let keys: Vec<u64> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, slot)) = self.subscribers.remove(&key) {
                if let Some(sink) = take_sink(slot) {
                    sink.settle(self.memoized());
                }
            }
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates an open promise with no subscribers.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(Cell {
                subscribers: DashMap::new(),
                next_key: AtomicU64::new(0),
                sealed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                memo: Mutex::new(None),
            }),
        }
    }

    /// Subscribes a continuation pair; see [`Promise::subscribe_sink`].
    pub fn subscribe(
        &self,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(TaskError) + Send + 'static,
    ) -> Canceller {
        self.subscribe_sink(Sink::new(on_success, on_failure))
    }

    /// Subscribes a sink. Open promise: the sink waits for completion and
    /// the returned canceller can withdraw it (delivering `Canceled` to it
    /// alone). Closed promise: immediate replay, no-op canceller.
    pub fn subscribe_sink(&self, sink: Sink<T>) -> Canceller {
        Cell::subscribe(&self.cell, sink)
    }

    /// Starts `task` and feeds its first outcome into this promise.
    ///
    /// Only the first terminal outcome (across all `complete`, `resolve`
    /// and `reject` calls) closes the promise; the rest are dropped.
    /// Returns the underlying execution's canceller.
    pub fn complete(&self, task: &Task<T>) -> Canceller {
        let on_ok = self.cell.clone();
        let on_err = self.cell.clone();
        task.run(
            move |value| on_ok.close(Ok(value)),
            move |fault| on_err.close(Err(fault)),
        )
    }

    /// Closes the promise directly with a success value.
    pub fn resolve(&self, value: T) {
        self.cell.close(Ok(value));
    }

    /// Closes the promise directly with a failure.
    pub fn reject(&self, fault: TaskError) {
        self.cell.close(Err(fault));
    }

    /// This promise viewed as a task: each run subscribes one sink.
    pub fn as_task(&self) -> Task<T> {
        let cell = self.cell.clone();
        Task::new(move |sink| Cell::subscribe(&cell, sink))
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::leaf::success;

    fn capture<T: Send + 'static>() -> (Arc<Mutex<Option<Outcome<T>>>>, Sink<T>) {
        let slot = Arc::new(Mutex::new(None));
        let writer = slot.clone();
        let sink = Sink::from_fn(move |outcome| {
            *writer.lock().unwrap() = Some(outcome);
        });
        (slot, sink)
    }

    #[test]
    fn test_every_subscriber_sees_the_same_outcome() {
        let promise = Promise::new();
        let (a, sink_a) = capture();
        let (b, sink_b) = capture();
        promise.subscribe_sink(sink_a);
        promise.subscribe_sink(sink_b);

        promise.resolve(7);

        assert_eq!(a.lock().unwrap().take(), Some(Ok(7)));
        assert_eq!(b.lock().unwrap().take(), Some(Ok(7)));
    }

    #[test]
    fn test_late_subscriber_gets_the_memoized_outcome() {
        let promise = Promise::new();
        promise.resolve(42);

        let (late, sink) = capture();
        let cancel = promise.subscribe_sink(sink);
        assert_eq!(late.lock().unwrap().take(), Some(Ok(42)));

        // cancel after replay is a no-op
        cancel.cancel();
        assert!(late.lock().unwrap().is_none());
    }

    #[test]
    fn test_second_completion_is_dropped() {
        let promise = Promise::new();
        promise.resolve(1);
        promise.resolve(2);
        promise.reject(TaskError::fail("too late"));

        let (seen, sink) = capture();
        promise.subscribe_sink(sink);
        assert_eq!(seen.lock().unwrap().take(), Some(Ok(1)));
    }

    #[test]
    fn test_canceling_one_subscriber_spares_the_rest() {
        let promise = Promise::new();
        let (gone, sink_gone) = capture();
        let (kept, sink_kept) = capture();
        let cancel_gone = promise.subscribe_sink(sink_gone);
        promise.subscribe_sink(sink_kept);

        cancel_gone.cancel();
        assert!(matches!(
            gone.lock().unwrap().take(),
            Some(Err(TaskError::Canceled))
        ));
        assert!(kept.lock().unwrap().is_none());

        promise.complete(&success(7));
        assert_eq!(kept.lock().unwrap().take(), Some(Ok(7)));
        assert!(gone.lock().unwrap().is_none(), "canceled subscriber saw a second delivery");
    }

    #[test]
    fn test_complete_feeds_failures_too() {
        let promise: Promise<i32> = Promise::new();
        let (seen, sink) = capture();
        promise.subscribe_sink(sink);

        promise.complete(&crate::leaf::failure("sour"));
        assert!(matches!(
            seen.lock().unwrap().take(),
            Some(Err(TaskError::Fail { reason })) if reason == "sour"
        ));
    }

    #[test]
    fn test_as_task_forwards_subscriptions() {
        let promise = Promise::new();
        let task = promise.as_task();
        let (seen, sink) = capture();
        task.run_sink(sink);

        promise.resolve("ready");
        assert_eq!(seen.lock().unwrap().take(), Some(Ok("ready")));
    }
}

//! # The serialized event loop behind every non-trivial combinator.
//!
//! [`task_with`] (and [`task_via`] for an explicit executor) builds a task
//! out of a *boot function*: boot wires [`Signal`]s to handler functions,
//! starts child work, and returns the initial handler state plus a
//! cancellation handler. Signals may fire from any thread at any time;
//! their handlers run strictly one at a time, in firing order, with
//! exclusive `&mut` access to the state.
//!
//! # High-level architecture
//!
//! ```text
//!  any thread            lock-free FIFO            executor thread
//!  ──────────            ──────────────            ───────────────
//!  signal.fire(x) ──►  queue of handler thunks ──►  pump: run one
//!  signal.fire(y) ──►  (SegQueue + depth ctr)       thunk at a time
//!                                                       │
//!                                     Pending ──────────┤ keep draining
//!                                     Done / Halt ──────┘ settle sink,
//!                                                         discard queue
//! ```
//!
//! - Signals fired while boot is still running are held (the depth
//!   counter starts at one as a boot guard) and drained only after boot
//!   returns, so wiring is complete before any handler runs.
//! - The pump is (re)submitted exactly on the empty→non-empty transition,
//!   and the counter is decremented only *after* a handler returns, so at
//!   most one pump is ever active: handlers never overlap and may mutate
//!   the state without locks.
//! - A handler decides the loop's fate by its return value: a
//!   [`Step::Pending`] keeps the loop alive, [`Step::Done`] /
//!   [`Step::Halt`] settle the task. A panicking handler halts the task
//!   with [`TaskError::Panicked`].
//! - Cancellation is just another signal: the boot-provided cancel
//!   handler runs through the same FIFO and observes state sequentially
//!   with every other handler.
//! - After settlement the loop is dead: late fires are rejected, and the
//!   rare straggler that already passed the liveness check lands in a
//!   discarded queue without ever running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_queue::SegQueue;

use crate::error::TaskError;
use crate::rig::{default_rig, Executor};
use crate::task::{Canceller, Sink, Task};

/// What an event-loop handler tells the pump.
///
/// `Pending` is the distinguished "no terminal result yet, keep
/// processing" value; the other two settle the task.
pub enum Step<T> {
    /// Not done yet; drain the next event.
    Pending,
    /// Terminal success.
    Done(T),
    /// Terminal failure.
    Halt(TaskError),
}

type Thunk<S, T> = Box<dyn FnOnce(&mut S) -> Step<T> + Send>;
type Handler<S, T> = Box<dyn Fn(&mut S) -> Step<T> + Send + Sync>;

/// What a boot function hands back to the loop.
pub struct Boot<S, T> {
    state: S,
    on_cancel: Handler<S, T>,
}

impl<S, T> Boot<S, T> {
    /// Packs the initial handler state and the cancellation handler.
    ///
    /// The cancellation handler is wrapped into a signal by the loop
    /// itself, so it runs serialized like any other handler. Typical
    /// policy: cancel the children, stay `Pending`.
    pub fn new(state: S, on_cancel: impl Fn(&mut S) -> Step<T> + Send + Sync + 'static) -> Self {
        Self {
            state,
            on_cancel: Box::new(on_cancel),
        }
    }
}

/// # Boot-time factory for [`Signal`]s.
///
/// Only usable while boot runs; each call pairs a handler function with a
/// thread-safe signal that enqueues one handler invocation per fire.
pub struct Wiring<S, T> {
    core: Arc<Core<S, T>>,
}

impl<S: Send + 'static, T: Send + 'static> Wiring<S, T> {
    /// Wraps `handler` into a fire-from-anywhere [`Signal`].
    ///
    /// Handlers created from the same wiring run in global firing order
    /// and never concurrently.
    pub fn signal<X>(
        &self,
        handler: impl Fn(&mut S, X) -> Step<T> + Send + Sync + 'static,
    ) -> Signal<X>
    where
        X: Send + 'static,
    {
        let core = self.core.clone();
        let handler = Arc::new(handler);
        Signal {
            emit: Arc::new(move |x: X| {
                let handler = handler.clone();
                Core::enqueue(&core, Box::new(move |state: &mut S| handler(state, x)));
            }),
        }
    }
}

/// # A thread-safe trigger for one event-loop handler.
///
/// Cloneable and cheap; every [`fire`](Signal::fire) enqueues one
/// invocation of the wrapped handler with the fired value. Fires after
/// the task settled are dropped.
pub struct Signal<X> {
    emit: Arc<dyn Fn(X) + Send + Sync>,
}

impl<X> Clone for Signal<X> {
    fn clone(&self) -> Self {
        Self {
            emit: self.emit.clone(),
        }
    }
}

impl<X: Send + 'static> Signal<X> {
    /// Enqueues one handler invocation carrying `x`.
    pub fn fire(&self, x: X) {
        (self.emit)(x)
    }
}

/// Handler state plus the outer sink, owned by whichever pump run is
/// active. `None` after settlement.
struct Seat<S, T> {
    state: S,
    sink: Sink<T>,
}

struct Core<S, T> {
    queue: SegQueue<Thunk<S, T>>,
    /// Queued-thunk count plus one while boot runs. The pump keeps its
    /// claim on an item until the handler returned, so an observer that
    /// sees zero knows no pump is active.
    depth: AtomicUsize,
    live: AtomicBool,
    seat: Mutex<Option<Seat<S, T>>>,
    exec: Arc<dyn Executor>,
}

fn lock<'a, S, T>(seat: &'a Mutex<Option<Seat<S, T>>>) -> MutexGuard<'a, Option<Seat<S, T>>> {
    seat.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S: Send + 'static, T: Send + 'static> Core<S, T> {
    fn new(exec: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Self {
            queue: SegQueue::new(),
            depth: AtomicUsize::new(1),
            live: AtomicBool::new(true),
            seat: Mutex::new(None),
            exec,
        })
    }

    fn enqueue(core: &Arc<Self>, thunk: Thunk<S, T>) {
        if !core.live.load(Ordering::Acquire) {
            return;
        }
        core.queue.push(thunk);
        if core.depth.fetch_add(1, Ordering::AcqRel) == 0 {
            Self::submit_pump(core);
        }
    }

    /// Drops the boot guard; anything enqueued during boot gets drained.
    fn release_boot(core: &Arc<Self>) {
        if core.depth.fetch_sub(1, Ordering::AcqRel) > 1 {
            Self::submit_pump(core);
        }
    }

    fn submit_pump(core: &Arc<Self>) {
        let claimed = core.clone();
        core.exec.submit(Box::new(move || Self::pump(&claimed)));
    }

    /// Drains queued handler invocations strictly serially until the
    /// queue runs dry or a handler settles the task.
    fn pump(core: &Arc<Self>) {
        let mut guard = lock(&core.seat);
        loop {
            let Some(seat) = guard.as_mut() else {
                // settled while this pump was in flight
                while core.queue.pop().is_some() {}
                return;
            };
            let Some(thunk) = core.queue.pop() else {
                return;
            };
            let step = panic::catch_unwind(AssertUnwindSafe(|| thunk(&mut seat.state)))
                .unwrap_or_else(|payload| Step::Halt(TaskError::from_panic(payload)));
            match step {
                Step::Pending => {
                    if core.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
                        return;
                    }
                }
                Step::Done(value) => {
                    let sink = core.retire(&mut guard);
                    drop(guard);
                    tracing::trace!("event loop settled with success");
                    if let Some(sink) = sink {
                        sink.succeed(value);
                    }
                    return;
                }
                Step::Halt(fault) => {
                    let sink = core.retire(&mut guard);
                    drop(guard);
                    tracing::trace!(error = %fault, "event loop settled with failure");
                    if let Some(sink) = sink {
                        sink.fail(fault);
                    }
                    return;
                }
            }
        }
    }

    /// Marks the loop dead and discards the queue; handler state (and the
    /// child cancellers it holds) drops here.
    fn retire(&self, guard: &mut MutexGuard<'_, Option<Seat<S, T>>>) -> Option<Sink<T>> {
        self.live.store(false, Ordering::Release);
        let seat = guard.take();
        while self.queue.pop().is_some() {}
        seat.map(|seat| seat.sink)
    }
}

/// Builds an event-loop task on the default rig; see [`task_via`].
pub fn task_with<S, T, B>(boot: B) -> Task<T>
where
    S: Send + 'static,
    T: Send + 'static,
    B: Fn(&Wiring<S, T>) -> Boot<S, T> + Send + Sync + 'static,
{
    task_via(default_rig(), boot)
}

/// Builds a task backed by a single-writer serialized event loop whose
/// pump runs on `exec`.
///
/// Each run of the resulting task creates a fresh loop, invokes `boot`
/// synchronously to wire signals and start children, then releases any
/// held events. The task's canceller fires the boot-provided cancellation
/// handler through the loop.
pub fn task_via<S, T, B>(exec: Arc<dyn Executor>, boot: B) -> Task<T>
where
    S: Send + 'static,
    T: Send + 'static,
    B: Fn(&Wiring<S, T>) -> Boot<S, T> + Send + Sync + 'static,
{
    Task::new(move |sink| {
        let core = Core::new(exec.clone());
        let wiring = Wiring { core: core.clone() };
        let Boot { state, on_cancel } = boot(&wiring);
        let cancel_signal = wiring.signal(move |state: &mut S, _fired: ()| on_cancel(state));
        *lock(&core.seat) = Some(Seat { state, sink });
        Core::release_boot(&core);
        Canceller::new(move || cancel_signal.fire(()))
    })
}

//! # taskflow
//!
//! **Taskflow** is a continuation-passing task library: a task is a plain
//! value describing a one-shot computation, and invoking it with a pair
//! of continuations starts an independent, cancelable execution. Effects
//! become values you can compose, store, and run on demand — on a thread
//! pool, a single-threaded queue, or inline.
//!
//! ## Features
//!
//! | Area            | Description                                                       | Key types / functions                        |
//! |-----------------|-------------------------------------------------------------------|----------------------------------------------|
//! | **Contract**    | Tasks as values: run with continuations, cancel cooperatively.    | [`Task`], [`Sink`], [`Canceller`]            |
//! | **Leaves**      | Immediate results, pool-backed effects, scheduled delays.         | [`success`], [`failure`], [`effect`], [`timeout`] |
//! | **Event loop**  | Serialized handler engine behind every non-trivial combinator.    | [`task_with`], [`Wiring`], [`Signal`], [`Step`] |
//! | **Combinators** | Parallel and sequential composition with failure-driven cancel.   | [`join`], [`race`], [`Task::then`], [`Task::or_else`] |
//! | **Promises**    | Completable, memoized, multi-subscriber tasks.                    | [`Promise`]                                  |
//! | **Waiting**     | Eager start + memoize; blocking wait; async bridge.               | [`start`], [`block_on`], [`Task::wait`]      |
//! | **Execution**   | Pluggable executor/scheduler with a tokio-backed default.         | [`Executor`], [`Scheduler`], [`TokioRig`], [`Config`] |
//!
//! ```no_run
//! use std::time::Duration;
//! use taskflow::{block_on, join_with, success, timeout, TaskError};
//!
//! // A task is a description; nothing runs until it is handed continuations.
//! let chores = join_with(
//!     |values: Vec<u32>| values.iter().sum::<u32>(),
//!     vec![timeout(Duration::from_millis(10), 2), success(40)],
//! );
//!
//! // Sequential composition, with recovery.
//! let pipeline = chores
//!     .then(|sum| success(sum))
//!     .or_else(|_fault: TaskError| success(0));
//!
//! assert_eq!(block_on(&pipeline), Ok(42));
//! ```
//!
//! ## Guarantees
//!
//! - Per execution, the success and failure continuations together fire
//!   **at most once**.
//! - Cancellation is cooperative, idempotent, and safe from any thread.
//! - Within one event loop, handlers run strictly serialized in firing
//!   order and share state without locks.
//! - Errors surface only through failure continuations; the engine never
//!   logs-and-drops.
//!
//! ---

mod combine;
mod config;
mod error;
mod leaf;
mod macros;
mod promise;
mod reactor;
mod rig;
mod task;
mod wait;

// ---- Public re-exports ----

pub use combine::{join, join_with, race};
pub use config::Config;
pub use error::TaskError;
pub use leaf::{
    effect, effect_blocking, effect_blocking_via, effect_via, failure, success, timeout,
    timeout_via,
};
pub use promise::Promise;
pub use reactor::{task_via, task_with, Boot, Signal, Step, Wiring};
pub use rig::{default_rig, Executor, Job, Scheduler, TokioRig};
pub use task::{Canceller, Outcome, Sink, Task};
pub use wait::{block_on, start};

//! # Composite combinators over the event loop.
//!
//! Parallel composition ([`join`], [`join_with`], [`race`]) and sequential
//! composition ([`Task::then`], [`Task::or_else`]) are all boot functions
//! for [`task_with`](crate::task_with): children deliver into signals,
//! handlers fold the deliveries into one outcome.
//!
//! Shared policy:
//! - failure of any `join` child cancels every sibling exactly once;
//! - success of any `race` child cancels every sibling exactly once;
//! - cancelling the outer task cancels every still-live child;
//! - once the outer task settled, cancellation is a no-op.

use std::sync::Arc;

use crate::error::TaskError;
use crate::leaf::failure;
use crate::reactor::{task_with, Boot, Step, Wiring};
use crate::task::{Canceller, Task};

fn cancel_all(kids: &[Canceller]) {
    for kid in kids {
        kid.cancel();
    }
}

struct JoinState<T> {
    /// `None` marks a slot no child delivered into yet.
    slots: Vec<Option<T>>,
    filled: usize,
    kids: Vec<Canceller>,
}

/// Runs every task in parallel; when all succeed, completes with
/// `f(values)` (values in child order). The first failure cancels the
/// remaining children and fails the whole task with that error.
///
/// An empty `tasks` completes synchronously with `f(vec![])`, during the
/// starting call, exactly like [`success`](crate::success).
pub fn join_with<T, R, F>(f: F, tasks: Vec<Task<T>>) -> Task<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    let f = Arc::new(f);
    if tasks.is_empty() {
        // nothing to wait for: no event loop, deliver from the starting call
        return Task::new(move |sink| {
            sink.succeed(f(Vec::new()));
            Canceller::noop()
        });
    }
    task_with(move |w: &Wiring<JoinState<T>, R>| {
        let size = tasks.len();

        let fold = f.clone();
        let arrived = w.signal(move |st: &mut JoinState<T>, (i, value): (usize, T)| {
            // first delivery per child wins; repeats are ignored
            if st.slots[i].is_none() {
                st.slots[i] = Some(value);
                st.filled += 1;
            }
            if st.filled == st.slots.len() {
                let values: Vec<T> = st.slots.drain(..).flatten().collect();
                Step::Done(fold(values))
            } else {
                Step::Pending
            }
        });
        let failed = w.signal(|st: &mut JoinState<T>, fault: TaskError| {
            cancel_all(&st.kids);
            Step::Halt(fault)
        });

        let kids = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let arrived = arrived.clone();
                let failed = failed.clone();
                task.run(move |v| arrived.fire((i, v)), move |e| failed.fire(e))
            })
            .collect();

        Boot::new(
            JoinState {
                slots: (0..size).map(|_| None).collect(),
                filled: 0,
                kids,
            },
            |st: &mut JoinState<T>| {
                cancel_all(&st.kids);
                Step::Pending
            },
        )
    })
}

/// [`join_with`] keeping the values as a vector.
pub fn join<T>(tasks: Vec<Task<T>>) -> Task<Vec<T>>
where
    T: Send + 'static,
{
    join_with(|values| values, tasks)
}

struct RaceState {
    faults: Vec<Option<TaskError>>,
    failed: usize,
    kids: Vec<Canceller>,
}

/// Runs every task in parallel; the first success cancels the remaining
/// children and wins. When every child failed, the whole task fails with
/// [`TaskError::AllFailed`] carrying each child error in child order.
///
/// An empty `tasks` fails synchronously with an empty aggregate, during
/// the starting call.
pub fn race<T>(tasks: Vec<Task<T>>) -> Task<T>
where
    T: Send + 'static,
{
    if tasks.is_empty() {
        return failure(TaskError::AllFailed { errors: Vec::new() });
    }
    task_with(move |w: &Wiring<RaceState, T>| {
        let size = tasks.len();

        let won = w.signal(|st: &mut RaceState, value: T| {
            cancel_all(&st.kids);
            Step::Done(value)
        });
        let lost = w.signal(|st: &mut RaceState, (i, fault): (usize, TaskError)| {
            if st.faults[i].is_none() {
                st.faults[i] = Some(fault);
                st.failed += 1;
            }
            if st.failed == st.faults.len() {
                let errors = st.faults.drain(..).flatten().collect();
                Step::Halt(TaskError::AllFailed { errors })
            } else {
                Step::Pending
            }
        });

        let kids = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let won = won.clone();
                let lost = lost.clone();
                task.run(move |v| won.fire(v), move |e| lost.fire((i, e)))
            })
            .collect();

        Boot::new(
            RaceState {
                faults: (0..size).map(|_| None).collect(),
                failed: 0,
                kids,
            },
            |st: &mut RaceState| {
                cancel_all(&st.kids);
                Step::Pending
            },
        )
    })
}

/// Tracks whichever task of a sequential chain is currently running, so
/// outer cancellation always reaches the live one.
struct SeqState {
    current: Canceller,
}

impl<T: Send + 'static> Task<T> {
    /// Sequential composition on success: when `self` succeeds with `x`,
    /// starts `f(x)` and settles with its outcome. Failures of either
    /// stage propagate. A panicking `f` halts the task.
    pub fn then<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Task<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        task_with(move |w: &Wiring<SeqState, U>| {
            let finish = w.signal(|_st: &mut SeqState, value: U| Step::Done(value));
            let halt = w.signal(|_st: &mut SeqState, fault: TaskError| Step::Halt(fault));

            let chain = {
                let f = f.clone();
                let finish = finish.clone();
                let halt = halt.clone();
                w.signal(move |st: &mut SeqState, value: T| {
                    let next = f(value);
                    let finish = finish.clone();
                    let halt = halt.clone();
                    st.current = next.run(move |v| finish.fire(v), move |e| halt.fire(e));
                    Step::Pending
                })
            };

            let to_chain = chain.clone();
            let to_halt = halt.clone();
            let current = self.run(move |v| to_chain.fire(v), move |e| to_halt.fire(e));

            Boot::new(SeqState { current }, |st: &mut SeqState| {
                st.current.cancel();
                Step::Pending
            })
        })
    }

    /// Sequential composition on failure: when `self` fails with `e`,
    /// starts `f(e)` and settles with its outcome. A success of `self`
    /// passes straight through.
    pub fn or_else<F>(self, f: F) -> Task<T>
    where
        F: Fn(TaskError) -> Task<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        task_with(move |w: &Wiring<SeqState, T>| {
            let finish = w.signal(|_st: &mut SeqState, value: T| Step::Done(value));
            let halt = w.signal(|_st: &mut SeqState, fault: TaskError| Step::Halt(fault));

            let recover = {
                let f = f.clone();
                let finish = finish.clone();
                let halt = halt.clone();
                w.signal(move |st: &mut SeqState, fault: TaskError| {
                    let fallback = f(fault);
                    let finish = finish.clone();
                    let halt = halt.clone();
                    st.current = fallback.run(move |v| finish.fire(v), move |e| halt.fire(e));
                    Step::Pending
                })
            };

            let to_finish = finish.clone();
            let to_recover = recover.clone();
            let current = self.run(move |v| to_finish.fire(v), move |e| to_recover.fire(e));

            Boot::new(SeqState { current }, |st: &mut SeqState| {
                st.current.cancel();
                Step::Pending
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::leaf::{success, timeout};
    use crate::wait::block_on;

    /// A task that never delivers but records cancellation.
    fn hang<T: Send + 'static>(canceled: &Arc<AtomicBool>) -> Task<T> {
        let canceled = canceled.clone();
        Task::new(move |_sink| {
            let canceled = canceled.clone();
            Canceller::new(move || canceled.store(true, Ordering::SeqCst))
        })
    }

    #[test]
    fn test_join_collects_in_child_order() {
        let task = join(vec![
            timeout(Duration::from_millis(20), 1),
            success(2),
            timeout(Duration::from_millis(5), 3),
        ]);
        assert_eq!(block_on(&task), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_join_with_applies_the_fold() {
        let task = join_with(|values: Vec<i32>| values.iter().product::<i32>(), vec![
            success(6),
            success(7),
        ]);
        assert_eq!(block_on(&task), Ok(42));
    }

    #[test]
    fn test_join_of_nothing_completes_during_the_starting_call() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        join::<i32>(vec![]).run(
            move |values| {
                *slot.lock().unwrap() = Some(values);
            },
            |_e| {},
        );
        // no waiting: the empty join is synchronous, like `success`
        assert_eq!(seen.lock().unwrap().take(), Some(vec![]));
    }

    #[test]
    fn test_join_fails_fast_and_cancels_siblings() {
        let canceled = Arc::new(AtomicBool::new(false));
        let task = join(vec![hang::<i32>(&canceled), failure("boom")]);

        assert!(matches!(
            block_on(&task),
            Err(TaskError::Fail { reason }) if reason == "boom"
        ));
        assert!(canceled.load(Ordering::SeqCst), "sibling was not canceled");
    }

    #[test]
    fn test_join_cancel_reaches_every_child() {
        let left = Arc::new(AtomicBool::new(false));
        let right = Arc::new(AtomicBool::new(false));
        let task = join(vec![hang::<i32>(&left), hang::<i32>(&right)]);

        let cancel = task.run(|_| {}, |_| {});
        cancel.cancel();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !(left.load(Ordering::SeqCst) && right.load(Ordering::SeqCst))
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(left.load(Ordering::SeqCst));
        assert!(right.load(Ordering::SeqCst));
    }

    #[test]
    fn test_race_first_success_wins_and_cancels_losers() {
        let canceled = Arc::new(AtomicBool::new(false));
        let task = race(vec![
            timeout(Duration::from_millis(10), "turtle"),
            hang::<&'static str>(&canceled),
        ]);

        assert_eq!(block_on(&task), Ok("turtle"));
        assert!(canceled.load(Ordering::SeqCst), "loser was not canceled");
    }

    #[test]
    fn test_race_aggregates_failures_in_child_order() {
        let task: Task<i32> = race(vec![failure("first"), failure("second")]);
        match block_on(&task) {
            Err(TaskError::AllFailed { errors }) => {
                let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                assert_eq!(
                    reasons,
                    vec!["execution failed: first", "execution failed: second"]
                );
            }
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_race_of_nothing_fails_during_the_starting_call() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        race::<i32>(vec![]).run(
            |_v| {},
            move |fault| {
                *slot.lock().unwrap() = Some(fault);
            },
        );
        assert!(matches!(
            seen.lock().unwrap().take(),
            Some(TaskError::AllFailed { errors }) if errors.is_empty()
        ));
    }

    #[test]
    fn test_then_chains_on_success() {
        let task = success(6).then(|x| success(x * (x + 1)));
        assert_eq!(block_on(&task), Ok(42));
    }

    #[test]
    fn test_then_skips_the_continuation_on_failure() {
        let reached = Arc::new(AtomicBool::new(false));
        let probe = reached.clone();
        let task = failure::<i32>("early").then(move |x| {
            probe.store(true, Ordering::SeqCst);
            success(x)
        });

        assert!(matches!(
            block_on(&task),
            Err(TaskError::Fail { reason }) if reason == "early"
        ));
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[test]
    fn test_then_panicking_step_halts() {
        let task = success(1).then(|_x| -> Task<i32> { panic!("bad step") });
        assert!(matches!(
            block_on(&task),
            Err(TaskError::Panicked { message }) if message == "bad step"
        ));
    }

    #[test]
    fn test_then_cancel_reaches_the_live_stage() {
        let canceled = Arc::new(AtomicBool::new(false));
        let second = hang::<i32>(&canceled);
        let task = timeout(Duration::from_millis(10), 1).then(move |_x| second.clone());

        let cancel = task.run(|_| {}, |_| {});
        std::thread::sleep(Duration::from_millis(60));
        cancel.cancel();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !canceled.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(canceled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_or_else_recovers_from_failure() {
        let task = failure::<String>("broken").or_else(|e| success(format!("saw: {e}")));
        assert_eq!(
            block_on(&task),
            Ok("saw: execution failed: broken".to_string())
        );
    }

    #[test]
    fn test_or_else_passes_success_through() {
        let reached = Arc::new(AtomicBool::new(false));
        let probe = reached.clone();
        let task = success(5).or_else(move |_e| {
            probe.store(true, Ordering::SeqCst);
            success(0)
        });

        assert_eq!(block_on(&task), Ok(5));
        assert!(!reached.load(Ordering::SeqCst));
    }
}

//! # Consumed execution interfaces and their tokio-backed default.
//!
//! The engine itself never spawns threads. Everything that needs a thread
//! goes through two tiny interfaces:
//!
//! - [`Executor`] submits a unit of work for later execution, either on
//!   the default compute pool or on an unbounded pool meant for blocking
//!   work.
//! - [`Scheduler`] schedules a delayed callback and hands back a
//!   [`Canceller`] for the pending timer.
//!
//! [`TokioRig`] implements both over a [`tokio`] runtime handle, and
//! [`default_rig`] lazily builds one process-wide rig for the
//! convenience constructors (`effect`, `timeout`, `task_with`).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::task::Canceller;

/// A unit of work accepted by an [`Executor`] or [`Scheduler`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// # Submits work for later execution.
///
/// Implementations must accept jobs from any thread and must not run them
/// inline on the submitting call.
pub trait Executor: Send + Sync + 'static {
    /// Submits a job to the default compute pool.
    fn submit(&self, job: Job);

    /// Submits a job to an unbounded pool intended for blocking work.
    fn submit_blocking(&self, job: Job);
}

/// # Schedules a delayed callback.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `job` after `delay`. The returned canceller drops the pending
    /// callback; cancelling after it fired is a no-op.
    fn schedule(&self, delay: Duration, job: Job) -> Canceller;
}

/// # Default [`Executor`] + [`Scheduler`] over a tokio runtime.
///
/// Either owns a runtime built from a [`Config`], or borrows the handle of
/// a runtime the application already drives.
pub struct TokioRig {
    handle: Handle,
    _owned: Option<Runtime>,
}

impl TokioRig {
    /// Builds a rig that owns its runtime.
    pub fn new(cfg: &Config) -> std::io::Result<Self> {
        let mut builder = Builder::new_multi_thread();
        if cfg.worker_threads > 0 {
            builder.worker_threads(cfg.worker_threads);
        }
        let runtime = builder
            .thread_name(format!("{}-worker", cfg.thread_name))
            .enable_time()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _owned: Some(runtime),
        })
    }

    /// Attaches to a runtime the application already owns.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            _owned: None,
        }
    }
}

impl Executor for TokioRig {
    fn submit(&self, job: Job) {
        self.handle.spawn(async move { job() });
    }

    fn submit_blocking(&self, job: Job) {
        self.handle.spawn_blocking(job);
    }
}

impl Scheduler for TokioRig {
    fn schedule(&self, delay: Duration, job: Job) -> Canceller {
        let token = CancellationToken::new();
        let armed = token.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = armed.cancelled() => {}
                _ = tokio::time::sleep(delay) => job(),
            }
        });
        Canceller::new(move || token.cancel())
    }
}

/// Returns the process-wide default rig, building it on first use.
///
/// # Panics
/// Panics if the default runtime cannot be built; there is no caller to
/// propagate to at that point.
pub fn default_rig() -> Arc<TokioRig> {
    static GLOBAL: OnceLock<Arc<TokioRig>> = OnceLock::new();
    GLOBAL
        .get_or_init(|| {
            let rig = TokioRig::new(&Config::default())
                .expect("failed to build the default taskflow runtime");
            Arc::new(rig)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_submit_runs_the_job() {
        let (tx, rx) = mpsc::channel();
        default_rig().submit(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(42));
    }

    #[test]
    fn test_submit_blocking_runs_the_job() {
        let (tx, rx) = mpsc::channel();
        default_rig().submit_blocking(Box::new(move || {
            std::thread::sleep(Duration::from_millis(5));
            let _ = tx.send(());
        }));
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_schedule_waits_for_the_delay() {
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        default_rig().schedule(
            Duration::from_millis(25),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_schedule_cancel_drops_the_callback() {
        let fired = Arc::new(AtomicBool::new(false));
        let probe = fired.clone();
        let cancel = default_rig().schedule(
            Duration::from_millis(30),
            Box::new(move || {
                probe.store(true, Ordering::SeqCst);
            }),
        );
        cancel.cancel();
        std::thread::sleep(Duration::from_millis(90));
        assert!(!fired.load(Ordering::SeqCst));
    }
}

//! # Configuration for the default execution rig.
//!
//! [`Config`] sizes the owned tokio runtime behind
//! [`default_rig`](crate::default_rig): worker thread count and thread
//! naming. Tasks constructed with an explicit executor
//! ([`task_via`](crate::task_via), [`effect_via`](crate::effect_via))
//! ignore it.
//!
//! # Example
//! ```
//! use taskflow::Config;
//!
//! let mut cfg = Config::default();
//! cfg.worker_threads = 2;
//! cfg.thread_name = "myapp-tasks".into();
//!
//! assert_eq!(cfg.worker_threads, 2);
//! ```

/// Sizing and naming for the owned default runtime.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of compute worker threads (0 = one per core).
    pub worker_threads: usize,
    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `worker_threads = 0` (one per core)
    /// - `thread_name = "taskflow"`
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: "taskflow".to_string(),
        }
    }
}

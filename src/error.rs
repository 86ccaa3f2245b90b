//! # Error types used by tasks and the combinator engine.
//!
//! A task fails by delivering a [`TaskError`] through its failure
//! continuation. The engine never logs errors and never swallows them:
//! every error surfaces exactly once, through exactly one continuation.
//!
//! `TaskError` is `Clone` so a memoized outcome can be replayed to any
//! number of promise subscribers.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// # Errors produced by task executions.
///
/// Covers the whole taxonomy the engine can report: application failures,
/// synthetic cancellation, panics caught at the engine boundary, the
/// aggregate of a lost race, and the refusal to block inside a runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The subscription was canceled before the task produced a result.
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination of one subscriber's interest.
    #[error("task canceled")]
    Canceled,

    /// Generic application failure carrying a human-readable reason.
    #[error("execution failed: {reason}")]
    Fail { reason: String },

    /// A wrapped domain error from application code.
    #[error("{source}")]
    App {
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A task body or event-loop handler panicked.
    #[error("panicked: {message}")]
    Panicked { message: String },

    /// Every competitor of a `race` failed; carries each child error
    /// in child order.
    #[error("no competitor succeeded ({} failures)", .errors.len())]
    AllFailed { errors: Vec<TaskError> },

    /// A blocking wait was requested on a thread that must not block
    /// (inside an async runtime worker).
    #[error("blocking wait is not available on this thread")]
    BlockUnsupported,
}

impl TaskError {
    /// Builds a [`TaskError::Fail`] from any reason text.
    pub fn fail(reason: impl Into<String>) -> Self {
        TaskError::Fail {
            reason: reason.into(),
        }
    }

    /// Wraps a domain error into [`TaskError::App`].
    pub fn app(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        TaskError::App {
            source: Arc::new(source),
        }
    }

    /// Converts a caught panic payload into [`TaskError::Panicked`].
    ///
    /// String payloads (`panic!("...")`) are preserved verbatim; anything
    /// else is reported as opaque.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked { message }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Canceled => "task_canceled",
            TaskError::Fail { .. } => "task_failed",
            TaskError::App { .. } => "task_app_error",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::AllFailed { .. } => "task_all_failed",
            TaskError::BlockUnsupported => "task_block_unsupported",
        }
    }

    /// Indicates whether this failure is a synthetic cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

/// Structural equality, except [`TaskError::App`] which compares the
/// wrapped error by identity.
impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TaskError::Canceled, TaskError::Canceled) => true,
            (TaskError::BlockUnsupported, TaskError::BlockUnsupported) => true,
            (TaskError::Fail { reason: a }, TaskError::Fail { reason: b }) => a == b,
            (TaskError::Panicked { message: a }, TaskError::Panicked { message: b }) => a == b,
            (TaskError::AllFailed { errors: a }, TaskError::AllFailed { errors: b }) => a == b,
            (TaskError::App { source: a }, TaskError::App { source: b }) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for TaskError {
    fn from(reason: String) -> Self {
        TaskError::Fail { reason }
    }
}

impl From<&str> for TaskError {
    fn from(reason: &str) -> Self {
        TaskError::Fail {
            reason: reason.to_string(),
        }
    }
}

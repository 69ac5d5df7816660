//! Error types for task definition, queuing, and lookup.
//!
//! [`TaskError`] covers everything that can go wrong *around* a task:
//! registering executables, talking to the queue backend, and converting
//! between typed and type-erased records. Failures raised *inside* an
//! executable are a different thing: the backend captures them as a
//! [`TaskFailure`] and stores them in the task's execution result. They
//! only surface as [`TaskError::Execution`] when a task is called directly,
//! bypassing the queue.

use thiserror::Error;

use crate::domain::result::TaskFailure;

/// Errors that can occur during task operations.
///
/// # Examples
///
/// ```
/// use quesadilla::TaskError;
///
/// let err = TaskError::NotFound {
///     task_id: "missing-task".to_string(),
/// };
/// assert!(err.to_string().contains("missing-task"));
/// assert!(!err.is_backend());
/// ```
#[derive(Debug, Error)]
pub enum TaskError {
    /// An executable failed while being called directly.
    #[error("task execution failed: {0}")]
    Execution(TaskFailure),

    /// The backend no longer knows a task that was previously queued.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The task ID that was not found.
        task_id: String,
    },

    /// An executable with this name is already registered on the queue.
    #[error("task executable already registered: {name}")]
    DuplicateExecutable {
        /// The conflicting executable name.
        name: String,
    },

    /// A task record references an executable the queue does not know.
    #[error("no task executable registered under name: {name}")]
    UnknownExecutable {
        /// The unresolved executable name.
        name: String,
    },

    /// An async executable was asked to run blocking on a thread that is
    /// driving a current-thread Tokio runtime, where it could never finish.
    #[error("async task executable {name} cannot run blocking inside a current-thread runtime; use aqueue")]
    BlockingUnsupported {
        /// The async executable's name.
        name: String,
    },

    /// A task with this ID has already been queued.
    #[error("task already queued: {task_id}")]
    DuplicateTask {
        /// The duplicated task ID.
        task_id: String,
    },

    /// The backend refused the record because it is full.
    #[error("queue capacity exceeded: limit is {limit} records")]
    CapacityExceeded {
        /// The configured record limit.
        limit: usize,
    },

    /// Conversion between a typed task and its generic record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The queue backend failed (I/O, connectivity, storage).
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TaskError {
    /// Returns `true` for infrastructure failures raised by the backend.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::CapacityExceeded { .. })
    }

    /// Returns the captured executable failure, if this is one.
    pub fn as_failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::Execution(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

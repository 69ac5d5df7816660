//! Execution outcomes: [`TaskExecutionResult`] and [`TaskFailure`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::PANIC_FAILURE_KIND;
use crate::error::TaskError;

/// An error captured from a failed executable.
///
/// Failures are data, not exceptions: a backend stores them in the task
/// record and callers inspect them through
/// [`QueuedTask::result`](crate::QueuedTask::result).
///
/// # Examples
///
/// ```
/// use quesadilla::TaskFailure;
///
/// let err = anyhow::anyhow!("disk full").context("writing thumbnail");
/// let failure = TaskFailure::from_anyhow("std::io::Error", &err);
/// assert_eq!(failure.kind, "std::io::Error");
/// assert_eq!(failure.message, "writing thumbnail");
/// assert_eq!(failure.causes, vec!["disk full".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Type name of the error (or a marker such as `"panic"`).
    pub kind: String,

    /// Display rendering of the error.
    pub message: String,

    /// Messages of the error's source chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl TaskFailure {
    /// Creates a failure with no cause chain.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Captures an [`anyhow::Error`] and its source chain.
    pub fn from_anyhow(kind: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            kind: kind.into(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// Captures a panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "executable panicked".to_string()
        };
        Self::new(PANIC_FAILURE_KIND, message)
    }

    /// Returns `true` if this failure was produced by a panic.
    pub fn is_panic(&self) -> bool {
        self.kind == PANIC_FAILURE_KIND
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of running an executable.
///
/// Absent until the backend finalizes the task; immutable afterwards.
///
/// # Examples
///
/// ```
/// use quesadilla::{TaskExecutionResult, TaskFailure};
///
/// let ok: TaskExecutionResult<i32> = TaskExecutionResult::Success(5);
/// assert!(ok.is_success());
/// assert_eq!(ok.success(), Some(&5));
///
/// let failed: TaskExecutionResult<i32> =
///     TaskExecutionResult::Failure(TaskFailure::new("ParseError", "bad digit"));
/// assert_eq!(failed.failure().map(|f| f.kind.as_str()), Some("ParseError"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum TaskExecutionResult<T> {
    /// The executable returned a value.
    Success(T),
    /// The executable failed.
    Failure(TaskFailure),
}

impl<T> TaskExecutionResult<T> {
    /// Returns `true` for [`Success`](Self::Success).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` for [`Failure`](Self::Failure).
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the produced value, if any.
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the captured failure, if any.
    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, TaskFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, TaskFailure>> for TaskExecutionResult<T> {
    fn from(result: Result<T, TaskFailure>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}

impl<T: Serialize> TaskExecutionResult<T> {
    /// Erases the value type for storage at the queue boundary.
    pub(crate) fn to_generic(&self) -> Result<TaskExecutionResult<Value>, TaskError> {
        Ok(match self {
            Self::Success(value) => TaskExecutionResult::Success(serde_json::to_value(value)?),
            Self::Failure(failure) => TaskExecutionResult::Failure(failure.clone()),
        })
    }
}

impl TaskExecutionResult<Value> {
    /// Restores the value type from a stored result.
    pub(crate) fn into_typed<T: DeserializeOwned>(
        self,
    ) -> Result<TaskExecutionResult<T>, TaskError> {
        Ok(match self {
            Self::Success(value) => TaskExecutionResult::Success(serde_json::from_value(value)?),
            Self::Failure(failure) => TaskExecutionResult::Failure(failure),
        })
    }
}

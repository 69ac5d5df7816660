//! Per-instance lifecycle record and its type-erased form.
//!
//! [`BaseTaskMetadata`] is what the caller observes about one queued
//! invocation. [`GenericQueuedTask`] is the same record with the result type
//! erased to JSON, plus the executable name, and is the only thing a
//! [`TaskQueue`](crate::queue::TaskQueue) ever stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::context::TaskExecutionContext;
use crate::domain::id::TaskId;
use crate::domain::result::TaskExecutionResult;

/// Lifecycle record of one queued task instance.
///
/// # Invariants
///
/// - `queued_at <= started_at <= finalized_at` whenever the timestamps are
///   present.
/// - `execution_result` is set if and only if `finalized_at` is set.
///
/// The caller side only ever reads this record. Backends advance it with
/// [`mark_started`](Self::mark_started) and [`finalize`](Self::finalize),
/// which keep both invariants; [`is_consistent`](Self::is_consistent)
/// checks them on records read back from elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTaskMetadata<T> {
    /// Unique, time-ordered identifier.
    pub id: TaskId,

    /// Arguments captured at enqueue time.
    pub execution_context: TaskExecutionContext,

    /// Outcome, once the backend has finalized the task.
    pub execution_result: Option<TaskExecutionResult<T>>,

    /// When the task was submitted.
    pub queued_at: Option<DateTime<Utc>>,

    /// When a backend began executing the task.
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished and the result was recorded.
    pub finalized_at: Option<DateTime<Utc>>,
}

impl<T> BaseTaskMetadata<T> {
    /// Creates a record for a task being queued now.
    pub fn queued(execution_context: TaskExecutionContext) -> Self {
        Self {
            id: TaskId::generate(),
            execution_context,
            execution_result: None,
            queued_at: Some(Utc::now()),
            started_at: None,
            finalized_at: None,
        }
    }

    /// Returns `true` once a result has been recorded.
    pub fn is_finalized(&self) -> bool {
        self.execution_result.is_some()
    }

    /// Returns `true` if a backend has started executing the task.
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Records the start of execution.
    ///
    /// The timestamp is clamped so it never precedes `queued_at`.
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        let at = self.queued_at.map_or(at, |queued| at.max(queued));
        self.started_at = Some(at);
    }

    /// Records the outcome and the end of execution.
    ///
    /// A task that was never marked started is treated as having started
    /// at the same instant. The timestamp is clamped so it never precedes
    /// `started_at`.
    pub fn finalize(&mut self, result: TaskExecutionResult<T>, at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.mark_started(at);
        }
        let at = self.started_at.map_or(at, |started| at.max(started));
        self.execution_result = Some(result);
        self.finalized_at = Some(at);
    }

    /// Checks the lifecycle invariants.
    pub fn is_consistent(&self) -> bool {
        let ordered = |a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        self.execution_result.is_some() == self.finalized_at.is_some()
            && ordered(self.queued_at, self.started_at)
            && ordered(self.started_at, self.finalized_at)
            && ordered(self.queued_at, self.finalized_at)
    }
}

/// Type-erased queued task, as stored by a [`TaskQueue`](crate::queue::TaskQueue).
///
/// Carries the executable name so that a backend can resolve the code to
/// run from the record alone.
///
/// # Examples
///
/// ```
/// use quesadilla::{GenericQueuedTask, TaskExecutionContext};
///
/// let ctx = TaskExecutionContext::capture(&(1, 2)).unwrap();
/// let record = GenericQueuedTask::new("add", ctx);
/// assert_eq!(record.task_name, "add");
/// assert!(record.metadata.queued_at.is_some());
/// assert!(!record.is_finalized());
///
/// let json = serde_json::to_string(&record).unwrap();
/// let back: GenericQueuedTask = serde_json::from_str(&json).unwrap();
/// assert_eq!(back, record);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericQueuedTask {
    /// Name of the registered executable that runs this task.
    pub task_name: String,

    /// Lifecycle record with the result erased to JSON.
    #[serde(flatten)]
    pub metadata: BaseTaskMetadata<Value>,
}

impl GenericQueuedTask {
    /// Creates a fresh record queued now.
    pub fn new(task_name: impl Into<String>, execution_context: TaskExecutionContext) -> Self {
        Self {
            task_name: task_name.into(),
            metadata: BaseTaskMetadata::queued(execution_context),
        }
    }

    /// Returns the record's task ID.
    pub fn id(&self) -> &TaskId {
        &self.metadata.id
    }

    /// Returns `true` once a result has been recorded.
    pub fn is_finalized(&self) -> bool {
        self.metadata.is_finalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    use crate::domain::result::TaskFailure;

    fn record() -> BaseTaskMetadata<Value> {
        BaseTaskMetadata::queued(TaskExecutionContext::capture(&(1, 2)).unwrap())
    }

    #[test]
    fn queued_record_is_pending() {
        let meta = record();
        assert!(meta.queued_at.is_some());
        assert!(!meta.is_started());
        assert!(!meta.is_finalized());
        assert!(meta.is_consistent());
    }

    #[test]
    fn finalize_sets_result_and_timestamps() {
        let mut meta = record();
        let now = Utc::now();
        meta.mark_started(now);
        meta.finalize(TaskExecutionResult::Success(json!(3)), now);
        assert!(meta.is_finalized());
        assert!(meta.finalized_at.is_some());
        assert!(meta.is_consistent());
    }

    #[test]
    fn finalize_without_start_backfills_started_at() {
        let mut meta = record();
        meta.finalize(
            TaskExecutionResult::Failure(TaskFailure::new("E", "boom")),
            Utc::now(),
        );
        assert_eq!(meta.started_at, meta.finalized_at);
        assert!(meta.is_consistent());
    }

    #[test]
    fn timestamps_are_clamped_to_keep_order() {
        let mut meta = record();
        let queued = meta.queued_at.unwrap();
        meta.mark_started(queued - Duration::seconds(5));
        assert_eq!(meta.started_at, Some(queued));
        meta.finalize(TaskExecutionResult::Success(json!(null)), queued - Duration::seconds(9));
        assert_eq!(meta.finalized_at, Some(queued));
        assert!(meta.is_consistent());
    }

    #[test]
    fn inconsistent_records_are_detected() {
        let mut meta = record();
        meta.finalized_at = Some(Utc::now());
        assert!(!meta.is_consistent());

        let mut meta = record();
        meta.started_at = meta.queued_at.map(|q| q - Duration::seconds(1));
        assert!(!meta.is_consistent());
    }

    #[test]
    fn generic_record_flattens_metadata() {
        let record = GenericQueuedTask::new("add", TaskExecutionContext::capture(&(1, 2)).unwrap());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["task_name"], "add");
        assert_eq!(json["id"], record.id().as_str());
        assert_eq!(json["execution_context"]["args"], json!([1, 2]));
        assert!(json["execution_result"].is_null());
    }
}

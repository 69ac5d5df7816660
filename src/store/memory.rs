//! In-memory task queue.
//!
//! [`InMemoryTaskQueue`] stores [`GenericQueuedTask`] records in a
//! `DashMap<String, GenericQueuedTask>` keyed by task id, and executables
//! in a second `DashMap` keyed by name. It plays the backend role end to
//! end: it accepts records, runs them (immediately or through a
//! [`Worker`](super::Worker)), captures failures and panics, and finalizes
//! the stored record.
//!
//! # Concurrency
//!
//! `DashMap` gives shard-level locking. A record is claimed by setting its
//! `started_at` under the shard lock, so two workers never run the same
//! record. No lock is held while an executable runs, so executables may
//! freely queue or look up other tasks.
//!
//! When `max_records` is set, the capacity check and the insert happen
//! under one admission lock, so concurrent submitters never push the queue
//! past the limit.
//!
//! # Blocking submission of async executables
//!
//! An eager `queue` runs the task on the calling thread. Async executables
//! are then driven by Tokio (see [`TaskExecutable::invoke_blocking`]). On a
//! current-thread runtime this is impossible, and `queue` returns
//! [`TaskError::BlockingUnsupported`] without storing the record; use
//! `aqueue` there.
//!
//! # Examples
//!
//! ```
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use quesadilla::store::memory::InMemoryTaskQueue;
//! use quesadilla::{sync_task, TaskExecutionResult};
//!
//! let queue = Arc::new(InMemoryTaskQueue::new());
//! let add = sync_task(queue.clone(), "add", |(a, b): (i64, i64)| {
//!     Ok::<_, Infallible>(a + b)
//! })
//! .unwrap();
//!
//! let done = add.queue((2, 3)).unwrap().wait().unwrap();
//! assert_eq!(done.result(), Some(&TaskExecutionResult::Success(5)));
//! assert_eq!(queue.len(), 1);
//! ```

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::context::TaskExecutionContext;
use crate::domain::id::TaskId;
use crate::domain::metadata::GenericQueuedTask;
use crate::domain::result::{TaskExecutionResult, TaskFailure};
use crate::error::TaskError;
use crate::executable::TaskExecutable;
use crate::queue::TaskQueue;

use super::{ExecutionMode, QueueConfig};

/// A claimed record: everything needed to run it without holding a lock.
struct Claim {
    task_id: String,
    execution_context: TaskExecutionContext,
    executable: TaskExecutable,
}

/// Thread-safe in-process [`TaskQueue`].
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    records: DashMap<String, GenericQueuedTask>,
    executables: DashMap<String, TaskExecutable>,
    config: QueueConfig,
    admission: Mutex<()>,
}

impl InMemoryTaskQueue {
    /// Creates an empty queue in [`ExecutionMode::Eager`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue configuration.
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of stored records, in any state.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of records no worker has started yet, oldest first.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .records
            .iter()
            .filter(|entry| !entry.value().metadata.is_started())
            .map(|entry| entry.value().id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Removes a record regardless of its state.
    pub fn remove(&self, task_id: &str) -> Option<GenericQueuedTask> {
        self.records.remove(task_id).map(|(_, record)| record)
    }

    /// Removes finalized records whose `finalized_at` is before `cutoff`.
    ///
    /// Returns the number of records removed. Pending and running records
    /// are never touched.
    pub fn purge_finalized(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            !matches!(record.metadata.finalized_at, Some(at) if at < cutoff)
        });
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, "purged finalized tasks");
        }
        removed
    }

    /// Marks a pending record as started and resolves its executable.
    ///
    /// Returns `None` if the record is gone or was already claimed.
    fn claim(&self, task_id: &str) -> Result<Option<Claim>, TaskError> {
        let Some(mut entry) = self.records.get_mut(task_id) else {
            return Ok(None);
        };
        let record = entry.value_mut();
        if record.metadata.is_started() {
            return Ok(None);
        }
        let executable = self
            .task_executable(&record.task_name)
            .ok_or_else(|| TaskError::UnknownExecutable {
                name: record.task_name.clone(),
            })?;
        record.metadata.mark_started(Utc::now());
        Ok(Some(Claim {
            task_id: task_id.to_string(),
            execution_context: record.metadata.execution_context.clone(),
            executable,
        }))
    }

    /// Stores the outcome of a claimed record.
    fn complete(&self, claim: &Claim, outcome: Result<Value, TaskFailure>) {
        if let Err(failure) = &outcome {
            tracing::warn!(
                task_id = %claim.task_id,
                task_name = claim.executable.name(),
                kind = %failure.kind,
                error = %failure.message,
                "task failed"
            );
        } else {
            tracing::debug!(
                task_id = %claim.task_id,
                task_name = claim.executable.name(),
                "task succeeded"
            );
        }
        match self.records.get_mut(&claim.task_id) {
            Some(mut entry) => entry
                .value_mut()
                .metadata
                .finalize(TaskExecutionResult::from(outcome), Utc::now()),
            None => tracing::warn!(
                task_id = %claim.task_id,
                "task removed while running; result dropped"
            ),
        }
    }

    /// Runs a pending record on the current thread and stores its outcome.
    ///
    /// Async executables are driven with
    /// [`TaskExecutable::invoke_blocking`]. Returns `Ok(false)` if the
    /// record is unknown or already claimed. Panics are recorded as
    /// failures of kind `"panic"`.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownExecutable`] if the record's executable is not
    /// registered, [`TaskError::BlockingUnsupported`] for an async
    /// executable on a current-thread runtime (the record stays pending).
    pub fn execute_blocking(&self, task_id: &str) -> Result<bool, TaskError> {
        let task_name = self.records.get(task_id).map(|entry| entry.task_name.clone());
        if let Some(executable) = task_name.and_then(|name| self.task_executable(&name)) {
            executable.ensure_blocking_supported()?;
        }
        let Some(claim) = self.claim(task_id)? else {
            return Ok(false);
        };
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            claim.executable.invoke_blocking(&claim.execution_context)
        }))
        .unwrap_or_else(|payload| Err(TaskFailure::from_panic(payload.as_ref())));
        self.complete(&claim, outcome);
        Ok(true)
    }

    /// Runs a pending record and stores its outcome.
    ///
    /// Same contract as [`execute_blocking`](Self::execute_blocking), but
    /// async executables are awaited on the current runtime.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownExecutable`] if the record's executable is not
    /// registered.
    pub async fn execute(&self, task_id: &str) -> Result<bool, TaskError> {
        let Some(claim) = self.claim(task_id)? else {
            return Ok(false);
        };
        let outcome = AssertUnwindSafe(claim.executable.invoke(&claim.execution_context))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskFailure::from_panic(payload.as_ref())));
        self.complete(&claim, outcome);
        Ok(true)
    }

    /// Validates and stores a new record. Returns its id.
    fn insert(&self, task: GenericQueuedTask) -> Result<String, TaskError> {
        if self.executables.get(&task.task_name).is_none() {
            return Err(TaskError::UnknownExecutable {
                name: task.task_name,
            });
        }
        // Removals only shrink the map, so they need not take this lock.
        let _admission = self.config.max_records.map(|_| self.admission.lock());
        if let Some(limit) = self.config.max_records {
            if self.records.len() >= limit {
                return Err(TaskError::CapacityExceeded { limit });
            }
        }
        let task_id = task.id().to_string();
        match self.records.entry(task_id.clone()) {
            Entry::Occupied(_) => Err(TaskError::DuplicateTask { task_id }),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(task_id)
            },
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    fn register_task_executable(&self, executable: TaskExecutable) -> Result<(), TaskError> {
        match self.executables.entry(executable.name().to_string()) {
            Entry::Occupied(entry) => Err(TaskError::DuplicateExecutable {
                name: entry.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(executable);
                Ok(())
            },
        }
    }

    fn task_executable(&self, name: &str) -> Option<TaskExecutable> {
        self.executables.get(name).map(|entry| entry.value().clone())
    }

    fn queue(&self, task: GenericQueuedTask) -> Result<(), TaskError> {
        if self.config.mode == ExecutionMode::Eager {
            if let Some(executable) = self.task_executable(&task.task_name) {
                executable.ensure_blocking_supported()?;
            }
        }
        let task_id = self.insert(task)?;
        if self.config.mode == ExecutionMode::Eager {
            self.execute_blocking(&task_id)?;
        }
        Ok(())
    }

    fn find(&self, task_id: &str) -> Result<Option<GenericQueuedTask>, TaskError> {
        Ok(self.records.get(task_id).map(|entry| entry.value().clone()))
    }

    async fn aqueue(&self, task: GenericQueuedTask) -> Result<(), TaskError> {
        let task_id = self.insert(task)?;
        if self.config.mode == ExecutionMode::Eager {
            self.execute(&task_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::{AsyncTaskExecutable, SyncTaskExecutable};
    use chrono::Duration;
    use serde_json::json;
    use std::convert::Infallible;

    fn add_executable() -> TaskExecutable {
        SyncTaskExecutable::new("add", |(a, b): (i64, i64)| Ok::<_, Infallible>(a + b)).into()
    }

    fn record(name: &str, args: impl serde::Serialize) -> GenericQueuedTask {
        GenericQueuedTask::new(name, TaskExecutionContext::capture(&args).unwrap())
    }

    fn deferred() -> InMemoryTaskQueue {
        let queue = InMemoryTaskQueue::new().with_config(QueueConfig::deferred());
        queue.register_task_executable(add_executable()).unwrap();
        queue
    }

    #[test]
    fn new_queue_is_empty() {
        let queue = InMemoryTaskQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.config().mode, ExecutionMode::Eager);
    }

    #[test]
    fn registration_rejects_duplicates() {
        let queue = InMemoryTaskQueue::new();
        queue.register_task_executable(add_executable()).unwrap();
        let err = queue.register_task_executable(add_executable()).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateExecutable { .. }));
        assert!(queue.task_executable("add").is_some());
        assert!(queue.task_executable("sub").is_none());
    }

    #[test]
    fn eager_queue_finalizes_before_returning() {
        let queue = InMemoryTaskQueue::new();
        queue.register_task_executable(add_executable()).unwrap();
        let task = record("add", (2, 3));
        let id = task.id().to_string();
        queue.queue(task).unwrap();

        let stored = queue.find(&id).unwrap().unwrap();
        assert_eq!(
            stored.metadata.execution_result,
            Some(TaskExecutionResult::Success(json!(5)))
        );
        assert!(stored.metadata.is_consistent());
    }

    #[test]
    fn deferred_queue_leaves_record_pending() {
        let queue = deferred();
        let task = record("add", (2, 3));
        let id = task.id().clone();
        queue.queue(task).unwrap();

        let stored = queue.find(id.as_str()).unwrap().unwrap();
        assert!(!stored.metadata.is_started());
        assert_eq!(queue.pending_ids(), vec![id]);
    }

    #[test]
    fn unknown_executable_is_rejected() {
        let queue = InMemoryTaskQueue::new();
        let err = queue.queue(record("missing", ())).unwrap_err();
        assert!(matches!(err, TaskError::UnknownExecutable { name } if name == "missing"));
        assert!(queue.is_empty());
    }

    #[test]
    fn requeueing_same_id_is_rejected() {
        let queue = deferred();
        let task = record("add", (1, 1));
        queue.queue(task.clone()).unwrap();
        let err = queue.queue(task).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTask { .. }));
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let queue = InMemoryTaskQueue::new().with_config(QueueConfig::deferred().with_max_records(1));
        queue.register_task_executable(add_executable()).unwrap();
        queue.queue(record("add", (1, 1))).unwrap();
        let err = queue.queue(record("add", (2, 2))).unwrap_err();
        assert!(matches!(err, TaskError::CapacityExceeded { limit: 1 }));
    }

    #[test]
    fn capacity_limit_holds_under_concurrent_submitters() {
        let queue = InMemoryTaskQueue::new().with_config(QueueConfig::deferred().with_max_records(5));
        queue.register_task_executable(add_executable()).unwrap();

        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..10)
                            .filter(|n| queue.queue(record("add", (*n, 1))).is_ok())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(accepted, 5);
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn find_unknown_id_is_none() {
        let queue = InMemoryTaskQueue::new();
        assert!(queue.find("nonexistent-id").unwrap().is_none());
    }

    #[test]
    fn execute_blocking_claims_once() {
        let queue = deferred();
        let task = record("add", (4, 4));
        let id = task.id().to_string();
        queue.queue(task).unwrap();
        assert!(queue.execute_blocking(&id).unwrap());
        assert!(!queue.execute_blocking(&id).unwrap());
        assert!(!queue.execute_blocking("gone").unwrap());
        assert!(queue.pending_ids().is_empty());
    }

    #[test]
    fn panics_become_failures() {
        let queue = InMemoryTaskQueue::new();
        queue
            .register_task_executable(
                SyncTaskExecutable::new("explode", |_: ()| -> Result<(), Infallible> {
                    panic!("kaboom")
                })
                .into(),
            )
            .unwrap();
        let task = record("explode", ());
        let id = task.id().to_string();
        queue.queue(task).unwrap();

        let stored = queue.find(&id).unwrap().unwrap();
        let failure = stored.metadata.execution_result.unwrap().into_result().unwrap_err();
        assert!(failure.is_panic());
        assert_eq!(failure.message, "kaboom");
    }

    #[tokio::test]
    async fn aqueue_awaits_async_executables() {
        let queue = InMemoryTaskQueue::new();
        queue
            .register_task_executable(
                AsyncTaskExecutable::new("sleepy", |ms: u64| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                    Ok::<_, Infallible>(ms)
                })
                .into(),
            )
            .unwrap();
        let task = record("sleepy", 5_u64);
        let id = task.id().to_string();
        queue.aqueue(task).await.unwrap();

        let stored = queue.afind(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.metadata.execution_result,
            Some(TaskExecutionResult::Success(json!(5)))
        );
    }

    fn sleepy_executable() -> TaskExecutable {
        AsyncTaskExecutable::new("sleepy", |ms: u64| async move {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok::<_, Infallible>(ms)
        })
        .into()
    }

    #[test]
    fn eager_blocking_queue_runs_async_timers_outside_runtime() {
        let queue = InMemoryTaskQueue::new();
        queue.register_task_executable(sleepy_executable()).unwrap();
        let task = record("sleepy", 2_u64);
        let id = task.id().to_string();
        queue.queue(task).unwrap();

        let stored = queue.find(&id).unwrap().unwrap();
        assert_eq!(
            stored.metadata.execution_result,
            Some(TaskExecutionResult::Success(json!(2)))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn eager_blocking_queue_runs_async_timers_on_multi_thread_runtime() {
        let queue = InMemoryTaskQueue::new();
        queue.register_task_executable(sleepy_executable()).unwrap();
        let task = record("sleepy", 2_u64);
        let id = task.id().to_string();
        queue.queue(task).unwrap();

        let stored = queue.afind(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.metadata.execution_result,
            Some(TaskExecutionResult::Success(json!(2)))
        );
    }

    #[tokio::test]
    async fn eager_blocking_queue_refuses_async_on_current_thread_runtime() {
        let queue = InMemoryTaskQueue::new();
        queue.register_task_executable(sleepy_executable()).unwrap();

        let err = queue.queue(record("sleepy", 2_u64)).unwrap_err();
        assert!(matches!(err, TaskError::BlockingUnsupported { name } if name == "sleepy"));
        assert!(queue.is_empty());

        // The async path is unaffected.
        let task = record("sleepy", 2_u64);
        let id = task.id().to_string();
        queue.aqueue(task).await.unwrap();
        assert!(queue.find(&id).unwrap().unwrap().is_finalized());
    }

    #[tokio::test]
    async fn execute_blocking_leaves_refused_record_pending() {
        let queue = InMemoryTaskQueue::new().with_config(QueueConfig::deferred());
        queue.register_task_executable(sleepy_executable()).unwrap();
        let task = record("sleepy", 1_u64);
        let id = task.id().clone();
        queue.queue(task).unwrap();

        let err = queue.execute_blocking(id.as_str()).unwrap_err();
        assert!(matches!(err, TaskError::BlockingUnsupported { .. }));
        assert_eq!(queue.pending_ids(), vec![id.clone()]);
        assert!(queue.execute(id.as_str()).await.unwrap());
    }

    #[test]
    fn purge_removes_only_old_finalized_records() {
        let queue = deferred();
        let done = record("add", (1, 2));
        let done_id = done.id().to_string();
        queue.queue(done).unwrap();
        queue.execute_blocking(&done_id).unwrap();
        queue.queue(record("add", (3, 4))).unwrap();

        assert_eq!(queue.purge_finalized(Utc::now() - Duration::hours(1)), 0);
        assert_eq!(queue.purge_finalized(Utc::now() + Duration::seconds(1)), 1);
        assert_eq!(queue.len(), 1);
        assert!(queue.find(&done_id).unwrap().is_none());
    }
}

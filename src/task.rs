//! Typed task handles and queued task instances.
//!
//! [`Task`] is what callers hold: submit work with [`queue`](Task::queue) /
//! [`aqueue`](Task::aqueue), look instances up with [`find`](Task::find) /
//! [`afind`](Task::afind), or run the function inline with `call`.
//!
//! [`QueuedTask`] is one submitted invocation. It is a snapshot: the
//! backend advances the stored record, and the caller observes progress by
//! asking for a fresh snapshot with [`refresh`](QueuedTask::refresh), or by
//! polling until completion with [`wait_for`](QueuedTask::wait_for) /
//! [`await_for`](QueuedTask::await_for).
//!
//! # Waiting
//!
//! Waiting is a plain fixed-interval poll with no timeout and no
//! cancellation. Bound it from the outside if needed:
//!
//! ```
//! # use std::convert::Infallible;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use quesadilla::store::memory::InMemoryTaskQueue;
//! # use quesadilla::store::QueueConfig;
//! # use quesadilla::sync_task;
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! // Deferred mode and no worker: the task never completes.
//! let queue = Arc::new(InMemoryTaskQueue::new().with_config(QueueConfig::deferred()));
//! let noop = sync_task(queue, "noop", |_: ()| Ok::<_, Infallible>(())).unwrap();
//! let queued = noop.aqueue(()).await.unwrap();
//!
//! let bounded = tokio::time::timeout(
//!     Duration::from_millis(50),
//!     queued.await_for(Duration::from_millis(5)),
//! )
//! .await;
//! assert!(bounded.is_err());
//! # });
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::DEFAULT_POLL_INTERVAL;
use crate::definition::{AsyncTaskDefinition, SyncTaskDefinition, TaskDefinition};
use crate::domain::context::TaskExecutionContext;
use crate::domain::id::TaskId;
use crate::domain::metadata::{BaseTaskMetadata, GenericQueuedTask};
use crate::domain::result::TaskExecutionResult;
use crate::error::TaskError;
use crate::queue::TaskQueue;

/// Typed handle over a task definition.
///
/// `A` is the argument type (captured into a [`TaskExecutionContext`]),
/// `T` the result type, and `D` the definition flavour. Cloning is cheap;
/// every clone shares the same definition and queue.
pub struct Task<A, T, D> {
    definition: Arc<D>,
    _types: PhantomData<fn(A) -> T>,
}

/// Task over a blocking executable.
pub type SyncTask<A, T> = Task<A, T, SyncTaskDefinition>;

/// Task over an async executable.
pub type AsyncTask<A, T> = Task<A, T, AsyncTaskDefinition>;

impl<A, T, D> Clone for Task<A, T, D> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            _types: PhantomData,
        }
    }
}

impl<A, T, D: fmt::Debug> fmt::Debug for Task<A, T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("definition", &self.definition)
            .finish()
    }
}

impl<A, T, D> Task<A, T, D>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
    D: TaskDefinition + 'static,
{
    /// Wraps a definition. The executable is expected to be registered
    /// on the definition's queue already.
    pub fn new(definition: D) -> Self {
        Self {
            definition: Arc::new(definition),
            _types: PhantomData,
        }
    }

    /// Registry name of the task's executable.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The underlying definition.
    pub fn definition(&self) -> &D {
        &self.definition
    }

    /// The queue this task submits to.
    pub fn task_queue(&self) -> &Arc<dyn TaskQueue> {
        self.definition.task_queue()
    }

    fn definition_ref(&self) -> Arc<dyn TaskDefinition> {
        self.definition.clone()
    }

    fn prepare(&self, args: &A) -> Result<(QueuedTask<T>, GenericQueuedTask), TaskError> {
        let execution_context = TaskExecutionContext::capture(args)?;
        let queued = QueuedTask {
            task_name: self.name().to_string(),
            metadata: BaseTaskMetadata::queued(execution_context),
            definition: self.definition_ref(),
        };
        let generic = queued.generic()?;
        Ok((queued, generic))
    }

    /// Submits the task for execution, blocking on the backend.
    ///
    /// Returns the local instance right away, with `queued_at` set and no
    /// result; use [`QueuedTask::wait_for`] to observe completion.
    ///
    /// # Errors
    ///
    /// [`TaskError::Serialization`] if the arguments cannot be captured,
    /// otherwise whatever the backend returns.
    pub fn queue(&self, args: A) -> Result<QueuedTask<T>, TaskError> {
        let (queued, generic) = self.prepare(&args)?;
        self.task_queue().queue(generic)?;
        tracing::debug!(task_id = %queued.id(), task_name = self.name(), "task queued");
        Ok(queued)
    }

    /// Submits the task for execution.
    ///
    /// # Errors
    ///
    /// Same as [`queue`](Self::queue).
    pub async fn aqueue(&self, args: A) -> Result<QueuedTask<T>, TaskError> {
        let (queued, generic) = self.prepare(&args)?;
        self.task_queue().aqueue(generic).await?;
        tracing::debug!(task_id = %queued.id(), task_name = self.name(), "task queued");
        Ok(queued)
    }

    /// Looks up a previously queued instance of this task, blocking on the
    /// backend.
    ///
    /// Returns `Ok(None)` if the id is unknown, or if it belongs to a
    /// different task.
    ///
    /// # Errors
    ///
    /// Backend failures, or [`TaskError::Serialization`] if the stored
    /// result does not deserialize into `T`.
    pub fn find(&self, task_id: &str) -> Result<Option<QueuedTask<T>>, TaskError> {
        let found = self.task_queue().find(task_id)?;
        self.adopt(found)
    }

    /// Looks up a previously queued instance of this task.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub async fn afind(&self, task_id: &str) -> Result<Option<QueuedTask<T>>, TaskError> {
        let found = self.task_queue().afind(task_id).await?;
        self.adopt(found)
    }

    fn adopt(&self, found: Option<GenericQueuedTask>) -> Result<Option<QueuedTask<T>>, TaskError> {
        match found {
            Some(generic) if generic.task_name == self.name() => {
                QueuedTask::from_generic(generic, self).map(Some)
            },
            Some(generic) => {
                tracing::debug!(
                    task_id = %generic.id(),
                    found = %generic.task_name,
                    expected = self.name(),
                    "record belongs to another task"
                );
                Ok(None)
            },
            None => Ok(None),
        }
    }
}

impl<A, T> Task<A, T, SyncTaskDefinition>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
{
    /// Runs the function inline, bypassing the queue. No metadata is
    /// recorded.
    ///
    /// # Errors
    ///
    /// [`TaskError::Execution`] if the function fails.
    pub fn call(&self, args: A) -> Result<T, TaskError> {
        let ctx = TaskExecutionContext::capture(&args)?;
        let output = self.definition.call(&ctx).map_err(TaskError::Execution)?;
        Ok(serde_json::from_value(output)?)
    }
}

impl<A, T> Task<A, T, AsyncTaskDefinition>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
{
    /// Runs the function inline, bypassing the queue. No metadata is
    /// recorded.
    ///
    /// # Errors
    ///
    /// [`TaskError::Execution`] if the function fails.
    pub async fn call(&self, args: A) -> Result<T, TaskError> {
        let ctx = TaskExecutionContext::capture(&args)?;
        let output = self
            .definition
            .call(&ctx)
            .await
            .map_err(TaskError::Execution)?;
        Ok(serde_json::from_value(output)?)
    }
}

/// One submitted invocation of a task.
///
/// A `QueuedTask` never changes after construction. [`refresh`](Self::refresh)
/// returns a new snapshot, so several holders of the same instance never
/// observe each other's polling.
pub struct QueuedTask<T> {
    task_name: String,
    metadata: BaseTaskMetadata<T>,
    definition: Arc<dyn TaskDefinition>,
}

impl<T> QueuedTask<T> {
    /// Unique id of this instance.
    pub fn id(&self) -> &TaskId {
        &self.metadata.id
    }

    /// Registry name of the executable that runs this instance.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The full lifecycle record.
    pub fn metadata(&self) -> &BaseTaskMetadata<T> {
        &self.metadata
    }

    /// Arguments captured at submission.
    pub fn execution_context(&self) -> &TaskExecutionContext {
        &self.metadata.execution_context
    }

    /// Outcome, once finalized.
    pub fn execution_result(&self) -> Option<&TaskExecutionResult<T>> {
        self.metadata.execution_result.as_ref()
    }

    /// Outcome of the execution.
    ///
    /// Reads the snapshot only; `None` until the backend has finalized the
    /// task. Call [`wait_for`](Self::wait_for) first to get a finalized
    /// snapshot.
    pub fn result(&self) -> Option<&TaskExecutionResult<T>> {
        self.execution_result()
    }

    /// Consumes the snapshot, returning its outcome.
    pub fn into_result(self) -> Option<TaskExecutionResult<T>> {
        self.metadata.execution_result
    }

    /// When the task was submitted.
    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.queued_at
    }

    /// When the backend started executing the task.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.started_at
    }

    /// When the backend recorded the outcome.
    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.finalized_at
    }

    /// Returns `true` once the outcome is recorded.
    pub fn is_finalized(&self) -> bool {
        self.metadata.is_finalized()
    }
}

impl<T: Serialize + DeserializeOwned> QueuedTask<T> {
    /// Rebuilds a typed instance from a stored record, bound to `task`.
    ///
    /// # Errors
    ///
    /// [`TaskError::Serialization`] if the stored result does not
    /// deserialize into `T`.
    pub fn from_generic<A, D>(
        generic: GenericQueuedTask,
        task: &Task<A, T, D>,
    ) -> Result<Self, TaskError>
    where
        A: Serialize,
        D: TaskDefinition + 'static,
    {
        Self::bind(generic, task.definition_ref())
    }

    fn bind(
        generic: GenericQueuedTask,
        definition: Arc<dyn TaskDefinition>,
    ) -> Result<Self, TaskError> {
        let GenericQueuedTask { task_name, metadata } = generic;
        let execution_result = metadata
            .execution_result
            .map(TaskExecutionResult::into_typed)
            .transpose()?;
        Ok(Self {
            task_name,
            metadata: BaseTaskMetadata {
                id: metadata.id,
                execution_context: metadata.execution_context,
                execution_result,
                queued_at: metadata.queued_at,
                started_at: metadata.started_at,
                finalized_at: metadata.finalized_at,
            },
            definition,
        })
    }

    /// Erases the result type for storage at the queue boundary.
    ///
    /// # Errors
    ///
    /// [`TaskError::Serialization`] if the result cannot be serialized.
    pub fn generic(&self) -> Result<GenericQueuedTask, TaskError> {
        let execution_result = self
            .metadata
            .execution_result
            .as_ref()
            .map(TaskExecutionResult::to_generic)
            .transpose()?;
        Ok(GenericQueuedTask {
            task_name: self.task_name.clone(),
            metadata: BaseTaskMetadata {
                id: self.metadata.id.clone(),
                execution_context: self.metadata.execution_context.clone(),
                execution_result,
                queued_at: self.metadata.queued_at,
                started_at: self.metadata.started_at,
                finalized_at: self.metadata.finalized_at,
            },
        })
    }

    fn refreshed(&self, found: Option<GenericQueuedTask>) -> Result<Self, TaskError> {
        let generic = found.ok_or_else(|| TaskError::NotFound {
            task_id: self.id().to_string(),
        })?;
        Self::bind(generic, Arc::clone(&self.definition))
    }

    /// Fetches the latest state of this instance, blocking on the backend.
    ///
    /// `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Backend failures, and [`TaskError::NotFound`] if the backend no
    /// longer holds the record.
    pub fn refresh(&self) -> Result<Self, TaskError> {
        let found = self.definition.task_queue().find(self.id().as_str())?;
        self.refreshed(found)
    }

    /// Fetches the latest state of this instance.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn arefresh(&self) -> Result<Self, TaskError> {
        let found = self.definition.task_queue().afind(self.id().as_str()).await?;
        self.refreshed(found)
    }

    /// Polls the backend every `interval` until a result is recorded,
    /// blocking the current thread.
    ///
    /// Never returns a snapshot without a result. There is no timeout:
    /// if the backend never finalizes the task, this never returns.
    ///
    /// # Errors
    ///
    /// The first error returned by [`refresh`](Self::refresh).
    pub fn wait_for(&self, interval: Duration) -> Result<Self, TaskError> {
        let mut polls: u64 = 0;
        loop {
            let current = self.refresh()?;
            polls += 1;
            if current.is_finalized() {
                tracing::debug!(task_id = %self.id(), polls, "task finalized");
                return Ok(current);
            }
            tracing::trace!(task_id = %self.id(), polls, "task not finalized yet");
            std::thread::sleep(interval);
        }
    }

    /// [`wait_for`](Self::wait_for) with [`DEFAULT_POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Same as [`wait_for`](Self::wait_for).
    pub fn wait(&self) -> Result<Self, TaskError> {
        self.wait_for(DEFAULT_POLL_INTERVAL)
    }

    /// Polls the backend every `interval` until a result is recorded.
    ///
    /// Suspends at each backend fetch and at each sleep, so other tasks
    /// keep running. There is no timeout; wrap the call in
    /// `tokio::time::timeout` to bound it.
    ///
    /// # Errors
    ///
    /// The first error returned by [`arefresh`](Self::arefresh).
    pub async fn await_for(&self, interval: Duration) -> Result<Self, TaskError> {
        let mut polls: u64 = 0;
        loop {
            let current = self.arefresh().await?;
            polls += 1;
            if current.is_finalized() {
                tracing::debug!(task_id = %self.id(), polls, "task finalized");
                return Ok(current);
            }
            tracing::trace!(task_id = %self.id(), polls, "task not finalized yet");
            tokio::time::sleep(interval).await;
        }
    }

    /// [`await_for`](Self::await_for) with [`DEFAULT_POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Same as [`await_for`](Self::await_for).
    pub async fn await_completion(&self) -> Result<Self, TaskError> {
        self.await_for(DEFAULT_POLL_INTERVAL).await
    }
}

impl<T: fmt::Debug> fmt::Debug for QueuedTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("task_name", &self.task_name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

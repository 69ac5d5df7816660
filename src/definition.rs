//! Task definitions: one executable bound to one queue.
//!
//! A definition is the blueprint of a task type. It is created once, by
//! [`sync_task`] or [`async_task`], which register the executable on the
//! queue and hand back a typed [`Task`] handle:
//!
//! ```
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use quesadilla::store::memory::InMemoryTaskQueue;
//! use quesadilla::sync_task;
//!
//! let queue = Arc::new(InMemoryTaskQueue::new());
//! let add = sync_task(queue.clone(), "add", |(a, b): (i64, i64)| {
//!     Ok::<_, Infallible>(a + b)
//! })
//! .unwrap();
//!
//! assert_eq!(add.name(), "add");
//! assert_eq!(add.call((2, 3)).unwrap(), 5);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::context::TaskExecutionContext;
use crate::domain::result::TaskFailure;
use crate::error::TaskError;
use crate::executable::{AsyncTaskExecutable, SyncTaskExecutable, TaskExecutable};
use crate::queue::TaskQueue;
use crate::task::{AsyncTask, SyncTask, Task};

/// Common view over sync and async definitions.
///
/// [`QueuedTask`](crate::QueuedTask) keeps an `Arc<dyn TaskDefinition>` to
/// find its way back to the queue on refresh.
pub trait TaskDefinition: Send + Sync {
    /// Registry name of the bound executable.
    fn name(&self) -> &str;

    /// The queue this definition submits to.
    fn task_queue(&self) -> &Arc<dyn TaskQueue>;

    /// The bound executable.
    fn executable(&self) -> TaskExecutable;
}

/// Definition over a blocking executable.
#[derive(Clone)]
pub struct SyncTaskDefinition {
    task_queue: Arc<dyn TaskQueue>,
    task_executable: SyncTaskExecutable,
}

impl SyncTaskDefinition {
    /// Binds `task_executable` to `task_queue` without registering it.
    pub fn new(task_queue: Arc<dyn TaskQueue>, task_executable: SyncTaskExecutable) -> Self {
        Self {
            task_queue,
            task_executable,
        }
    }

    /// Runs the executable inline, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns the executable's captured failure.
    pub fn call(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        self.task_executable.invoke(ctx)
    }
}

impl TaskDefinition for SyncTaskDefinition {
    fn name(&self) -> &str {
        self.task_executable.name()
    }

    fn task_queue(&self) -> &Arc<dyn TaskQueue> {
        &self.task_queue
    }

    fn executable(&self) -> TaskExecutable {
        TaskExecutable::Sync(self.task_executable.clone())
    }
}

impl fmt::Debug for SyncTaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTaskDefinition")
            .field("task_executable", &self.task_executable)
            .finish_non_exhaustive()
    }
}

/// Definition over an async executable.
#[derive(Clone)]
pub struct AsyncTaskDefinition {
    task_queue: Arc<dyn TaskQueue>,
    task_executable: AsyncTaskExecutable,
}

impl AsyncTaskDefinition {
    /// Binds `task_executable` to `task_queue` without registering it.
    pub fn new(task_queue: Arc<dyn TaskQueue>, task_executable: AsyncTaskExecutable) -> Self {
        Self {
            task_queue,
            task_executable,
        }
    }

    /// Runs the executable inline, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns the executable's captured failure.
    pub async fn call(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        self.task_executable.invoke(ctx).await
    }
}

impl TaskDefinition for AsyncTaskDefinition {
    fn name(&self) -> &str {
        self.task_executable.name()
    }

    fn task_queue(&self) -> &Arc<dyn TaskQueue> {
        &self.task_queue
    }

    fn executable(&self) -> TaskExecutable {
        TaskExecutable::Async(self.task_executable.clone())
    }
}

impl fmt::Debug for AsyncTaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTaskDefinition")
            .field("task_executable", &self.task_executable)
            .finish_non_exhaustive()
    }
}

/// Registers a blocking function on `task_queue` and returns its task handle.
///
/// # Errors
///
/// Whatever the queue's registration returns, e.g.
/// [`TaskError::DuplicateExecutable`] from the in-memory queue.
pub fn sync_task<A, T, E, F>(
    task_queue: Arc<dyn TaskQueue>,
    name: impl Into<String>,
    f: F,
) -> Result<SyncTask<A, T>, TaskError>
where
    F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    A: Serialize + DeserializeOwned,
    T: Serialize + DeserializeOwned,
    E: Into<anyhow::Error>,
{
    let task_executable = SyncTaskExecutable::new(name, f);
    task_queue.register_task_executable(TaskExecutable::Sync(task_executable.clone()))?;
    tracing::debug!(task_name = task_executable.name(), "registered sync task");
    Ok(Task::new(SyncTaskDefinition::new(task_queue, task_executable)))
}

/// Registers an async function on `task_queue` and returns its task handle.
///
/// # Errors
///
/// Whatever the queue's registration returns, e.g.
/// [`TaskError::DuplicateExecutable`] from the in-memory queue.
pub fn async_task<A, T, E, F, Fut>(
    task_queue: Arc<dyn TaskQueue>,
    name: impl Into<String>,
    f: F,
) -> Result<AsyncTask<A, T>, TaskError>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Serialize + DeserializeOwned,
    T: Serialize + DeserializeOwned + 'static,
    E: Into<anyhow::Error> + 'static,
{
    let task_executable = AsyncTaskExecutable::new(name, f);
    task_queue.register_task_executable(TaskExecutable::Async(task_executable.clone()))?;
    tracing::debug!(task_name = task_executable.name(), "registered async task");
    Ok(Task::new(AsyncTaskDefinition::new(task_queue, task_executable)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryTaskQueue;
    use serde_json::json;
    use std::convert::Infallible;

    #[test]
    fn sync_task_registers_executable() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let task = sync_task(queue.clone(), "square", |n: i64| Ok::<_, Infallible>(n * n)).unwrap();
        let registered = queue.task_executable("square").expect("registered");
        assert!(!registered.is_async());
        assert_eq!(task.definition().name(), "square");
    }

    #[test]
    fn duplicate_names_are_rejected_by_the_queue() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        sync_task(queue.clone(), "job", |_: ()| Ok::<_, Infallible>(())).unwrap();
        let err = async_task(queue, "job", |_: ()| async { Ok::<_, Infallible>(()) }).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateExecutable { name } if name == "job"));
    }

    #[test]
    fn sync_definition_calls_inline() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let exe = SyncTaskExecutable::new("neg", |n: i64| Ok::<_, Infallible>(-n));
        let definition = SyncTaskDefinition::new(queue.clone(), exe);
        let ctx = TaskExecutionContext::capture(&4).unwrap();
        assert_eq!(definition.call(&ctx), Ok(json!(-4)));
        // Never registered, never queued.
        assert!(queue.task_executable("neg").is_none());
    }

    #[tokio::test]
    async fn async_definition_calls_inline() {
        let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
        let exe = AsyncTaskExecutable::new("len", |s: String| async move {
            Ok::<_, Infallible>(s.len())
        });
        let definition = AsyncTaskDefinition::new(queue, exe);
        let ctx = TaskExecutionContext::capture("four").unwrap();
        assert_eq!(definition.call(&ctx).await, Ok(json!(4)));
        assert!(definition.executable().is_async());
    }
}

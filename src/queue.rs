//! The queue backend boundary.
//!
//! [`TaskQueue`] is the only seam between the task core and whatever
//! actually stores and runs work (in-process map, database, broker). It
//! deals exclusively in [`GenericQueuedTask`] records so that one queue can
//! serve tasks of every argument and result type.
//!
//! # Contract
//!
//! - `queue`/`aqueue` accept a freshly created record for execution. They
//!   may block on (or await) I/O.
//! - `find`/`afind` return the latest stored state of a record, or
//!   `Ok(None)` if the id is unknown. Not-found is never an error.
//! - `register_task_executable` adds a named executable to the queue's
//!   registry so that a worker can resolve the code to run from a record's
//!   `task_name` alone. Duplicate-name policy belongs to the implementation.
//! - Backend failures are returned as errors and propagate unmodified to
//!   the caller of [`Task::queue`](crate::Task::queue),
//!   [`Task::find`](crate::Task::find) and
//!   [`QueuedTask::refresh`](crate::QueuedTask::refresh).
//! - Executable failures are *not* errors at this boundary: the backend
//!   records them as a `Failure` result.
//! - Implementations own their concurrency safety. The core shares one
//!   `Arc<dyn TaskQueue>` across every task, definition and instance.

use async_trait::async_trait;

use crate::domain::metadata::GenericQueuedTask;
use crate::error::TaskError;
use crate::executable::TaskExecutable;

/// Storage and dispatch backend for queued tasks.
///
/// The async methods default to their blocking counterparts, which is the
/// right choice for backends whose operations never block (such as
/// [`InMemoryTaskQueue`](crate::store::memory::InMemoryTaskQueue)). Backends
/// doing real I/O should override both sides.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Adds an executable to the queue's name registry.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory queue returns
    /// [`TaskError::DuplicateExecutable`] for a name that is already taken.
    fn register_task_executable(&self, executable: TaskExecutable) -> Result<(), TaskError>;

    /// Resolves a registered executable by name.
    fn task_executable(&self, name: &str) -> Option<TaskExecutable>;

    /// Submits a record for execution, blocking on backend I/O.
    ///
    /// # Errors
    ///
    /// Any backend failure, returned unmodified.
    fn queue(&self, task: GenericQueuedTask) -> Result<(), TaskError>;

    /// Looks up a record by id, blocking on backend I/O.
    ///
    /// # Errors
    ///
    /// Any backend failure, returned unmodified. An unknown id is `Ok(None)`.
    fn find(&self, task_id: &str) -> Result<Option<GenericQueuedTask>, TaskError>;

    /// Submits a record for execution.
    ///
    /// # Errors
    ///
    /// Same as [`queue`](Self::queue).
    async fn aqueue(&self, task: GenericQueuedTask) -> Result<(), TaskError> {
        self.queue(task)
    }

    /// Looks up a record by id.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    async fn afind(&self, task_id: &str) -> Result<Option<GenericQueuedTask>, TaskError> {
        self.find(task_id)
    }
}

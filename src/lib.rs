//! Typed background tasks over a pluggable queue backend.
//!
//! Quesadilla turns ordinary functions into queueable tasks. A function is
//! registered once on a [`TaskQueue`], producing a typed [`Task`] handle.
//! Calling [`Task::queue`] captures the arguments, stores a record on the
//! queue and returns a [`QueuedTask`] that can be refreshed or waited on
//! until the backend records a [`TaskExecutionResult`].
//!
//! # Overview
//!
//! ```
//! use std::sync::Arc;
//! use quesadilla::store::memory::InMemoryTaskQueue;
//! use quesadilla::{sync_task, TaskExecutionResult};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("division by zero")]
//! struct DivideByZero;
//!
//! let queue = Arc::new(InMemoryTaskQueue::new());
//! let divide = sync_task(queue, "divide", |(a, b): (i64, i64)| {
//!     if b == 0 { Err(DivideByZero) } else { Ok(a / b) }
//! })
//! .unwrap();
//!
//! let ok = divide.queue((10, 2)).unwrap().wait().unwrap();
//! assert_eq!(ok.result(), Some(&TaskExecutionResult::Success(5)));
//!
//! let failed = divide.queue((1, 0)).unwrap().wait().unwrap();
//! let failure = failed.result().and_then(|r| r.failure()).unwrap();
//! assert_eq!(failure.message, "division by zero");
//!
//! // The same function, inline.
//! assert_eq!(divide.call((9, 3)).unwrap(), 3);
//! ```
//!
//! # Module Organization
//!
//! - [`domain`] - Ids, execution contexts, results and record metadata
//! - [`executable`] - Type-erased sync and async executables
//! - [`queue`] - The [`TaskQueue`] backend trait
//! - [`definition`] - Task definitions and the [`sync_task`] / [`async_task`] constructors
//! - [`task`] - [`Task`] handles and [`QueuedTask`] snapshots
//! - [`store`] - In-memory queue, worker and queue configuration
//! - [`error`] - The [`TaskError`] type
//! - [`constants`] - Poll interval and failure kind constants
//!
//! # Features
//!
//! - `logging` (default): [`logging::init`] installs a `tracing-subscriber`
//!   formatter driven by `RUST_LOG`.

pub mod constants;
pub mod definition;
pub mod domain;
pub mod error;
pub mod executable;
#[cfg(feature = "logging")]
pub mod logging;
pub mod queue;
pub mod store;
pub mod task;

// Re-exports for ergonomic access
pub use constants::DEFAULT_POLL_INTERVAL;
pub use definition::{async_task, sync_task, AsyncTaskDefinition, SyncTaskDefinition, TaskDefinition};
pub use domain::{
    ArgumentShape, BaseTaskMetadata, GenericQueuedTask, TaskExecutionContext, TaskExecutionResult, TaskFailure,
    TaskId,
};
pub use error::TaskError;
pub use executable::{AsyncTaskExecutable, SyncTaskExecutable, TaskExecutable};
pub use queue::TaskQueue;
pub use task::{AsyncTask, QueuedTask, SyncTask, Task};

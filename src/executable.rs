//! Named callables that a queue can resolve and run.
//!
//! A [`TaskExecutable`] wraps a user function behind a uniform,
//! type-erased interface: it takes a [`TaskExecutionContext`] and produces
//! either a JSON value or a [`TaskFailure`]. The function's own argument
//! and result types are recovered at the edges with serde, so a backend
//! only ever needs the executable's name and the stored context to run it.
//!
//! Executables never retry and never time out. A returned error is handed
//! back to the caller of [`invoke`](TaskExecutable::invoke); turning it into
//! a stored [`TaskExecutionResult::Failure`](crate::TaskExecutionResult::Failure)
//! is the backend's job.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{INVALID_ARGUMENTS_KIND, INVALID_OUTPUT_KIND, RUNTIME_UNAVAILABLE_KIND};
use crate::domain::context::TaskExecutionContext;
use crate::domain::result::TaskFailure;
use crate::error::TaskError;

type SyncFn = dyn Fn(&TaskExecutionContext) -> Result<Value, TaskFailure> + Send + Sync;

type AsyncFn =
    dyn Fn(&TaskExecutionContext) -> BoxFuture<'static, Result<Value, TaskFailure>> + Send + Sync;

fn invalid_arguments(err: TaskError) -> TaskFailure {
    TaskFailure::new(INVALID_ARGUMENTS_KIND, err.to_string())
}

fn invalid_output(err: serde_json::Error) -> TaskFailure {
    TaskFailure::new(INVALID_OUTPUT_KIND, err.to_string())
}

fn capture_error<E: Into<anyhow::Error>>(err: E) -> TaskFailure {
    TaskFailure::from_anyhow(std::any::type_name::<E>(), &err.into())
}

/// Executable wrapping a blocking function.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use quesadilla::{SyncTaskExecutable, TaskExecutionContext};
/// use serde_json::json;
///
/// let add = SyncTaskExecutable::new("add", |(a, b): (i64, i64)| Ok::<_, Infallible>(a + b));
/// let ctx = TaskExecutionContext::capture(&(2, 3)).unwrap();
/// assert_eq!(add.invoke(&ctx), Ok(json!(5)));
/// ```
#[derive(Clone)]
pub struct SyncTaskExecutable {
    name: String,
    func: Arc<SyncFn>,
}

impl SyncTaskExecutable {
    /// Wraps `f` under the registry name `name`.
    pub fn new<A, T, E, F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
        A: DeserializeOwned,
        T: Serialize,
        E: Into<anyhow::Error>,
    {
        let func = move |ctx: &TaskExecutionContext| -> Result<Value, TaskFailure> {
            let args = ctx.extract::<A>().map_err(invalid_arguments)?;
            let output = f(args).map_err(capture_error)?;
            serde_json::to_value(output).map_err(invalid_output)
        };
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the wrapped function with the captured arguments.
    ///
    /// # Errors
    ///
    /// Returns the function's error captured as a [`TaskFailure`], or a
    /// failure of kind `invalid_arguments` / `invalid_output` when the
    /// context or the output does not fit the function's types.
    pub fn invoke(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for SyncTaskExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTaskExecutable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Executable wrapping an async function.
///
/// # Examples
///
/// ```
/// use quesadilla::{AsyncTaskExecutable, TaskExecutionContext};
/// use serde_json::json;
///
/// let shout = AsyncTaskExecutable::new("shout", |word: String| async move {
///     Ok::<_, std::convert::Infallible>(word.to_uppercase())
/// });
/// let ctx = TaskExecutionContext::capture("hi").unwrap();
/// let out = futures::executor::block_on(shout.invoke(&ctx));
/// assert_eq!(out, Ok(json!("HI")));
/// ```
#[derive(Clone)]
pub struct AsyncTaskExecutable {
    name: String,
    func: Arc<AsyncFn>,
}

impl AsyncTaskExecutable {
    /// Wraps `f` under the registry name `name`.
    pub fn new<A, T, E, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: DeserializeOwned,
        T: Serialize + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let func = move |ctx: &TaskExecutionContext| -> BoxFuture<'static, Result<Value, TaskFailure>> {
            let args = match ctx.extract::<A>() {
                Ok(args) => args,
                Err(err) => return future::ready(Err(invalid_arguments(err))).boxed(),
            };
            let fut = f(args);
            async move {
                let output = fut.await.map_err(capture_error)?;
                serde_json::to_value(output).map_err(invalid_output)
            }
            .boxed()
        };
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the wrapped function and waits for it to complete.
    ///
    /// # Errors
    ///
    /// Same as [`SyncTaskExecutable::invoke`].
    pub async fn invoke(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        (self.func)(ctx).await
    }
}

impl fmt::Debug for AsyncTaskExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTaskExecutable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A registered executable, sync or async.
#[derive(Debug, Clone)]
pub enum TaskExecutable {
    /// Blocking function.
    Sync(SyncTaskExecutable),
    /// Async function.
    Async(AsyncTaskExecutable),
}

impl TaskExecutable {
    /// Returns the registry name.
    pub fn name(&self) -> &str {
        match self {
            Self::Sync(exe) => exe.name(),
            Self::Async(exe) => exe.name(),
        }
    }

    /// Returns `true` for async executables.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Runs the executable; sync functions run inline on the current task.
    ///
    /// # Errors
    ///
    /// Returns the captured [`TaskFailure`] of the underlying function.
    pub async fn invoke(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        match self {
            Self::Sync(exe) => exe.invoke(ctx),
            Self::Async(exe) => exe.invoke(ctx).await,
        }
    }

    /// Checks that [`invoke_blocking`](Self::invoke_blocking) can run this
    /// executable on the current thread.
    ///
    /// # Errors
    ///
    /// [`TaskError::BlockingUnsupported`] for an async executable when the
    /// current thread belongs to a current-thread Tokio runtime.
    pub fn ensure_blocking_supported(&self) -> Result<(), TaskError> {
        match (self, Handle::try_current()) {
            (Self::Async(exe), Ok(handle))
                if handle.runtime_flavor() != RuntimeFlavor::MultiThread =>
            {
                Err(TaskError::BlockingUnsupported {
                    name: exe.name().to_string(),
                })
            },
            _ => Ok(()),
        }
    }

    /// Runs the executable on the current thread, blocking until done.
    ///
    /// Async functions run on Tokio, so timers and I/O work:
    ///
    /// - inside a multi-thread runtime, through
    ///   [`block_in_place`](tokio::task::block_in_place) on the ambient
    ///   runtime;
    /// - outside any runtime, on a temporary current-thread runtime.
    ///
    /// Inside a current-thread runtime an async function cannot be driven
    /// without stalling that runtime; call
    /// [`ensure_blocking_supported`](Self::ensure_blocking_supported) first
    /// and use [`invoke`](Self::invoke) from async code instead.
    ///
    /// # Errors
    ///
    /// Returns the captured [`TaskFailure`] of the underlying function, or a
    /// failure of kind `runtime_unavailable` when no runtime can drive it.
    pub fn invoke_blocking(&self, ctx: &TaskExecutionContext) -> Result<Value, TaskFailure> {
        let exe = match self {
            Self::Sync(exe) => return exe.invoke(ctx),
            Self::Async(exe) => exe,
        };
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(exe.invoke(ctx)))
            },
            Ok(_) => Err(TaskFailure::new(
                RUNTIME_UNAVAILABLE_KIND,
                TaskError::BlockingUnsupported {
                    name: exe.name().to_string(),
                }
                .to_string(),
            )),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| TaskFailure::new(RUNTIME_UNAVAILABLE_KIND, e.to_string()))?
                .block_on(exe.invoke(ctx)),
        }
    }
}

impl From<SyncTaskExecutable> for TaskExecutable {
    fn from(exe: SyncTaskExecutable) -> Self {
        Self::Sync(exe)
    }
}

impl From<AsyncTaskExecutable> for TaskExecutable {
    fn from(exe: AsyncTaskExecutable) -> Self {
        Self::Async(exe)
    }
}

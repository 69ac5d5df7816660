//! Reference queue backend and its configuration.
//!
//! # Architecture
//!
//! The core talks to backends only through the
//! [`TaskQueue`](crate::queue::TaskQueue) trait. This module provides an
//! in-process implementation of that trait:
//!
//! - [`InMemoryTaskQueue`](memory::InMemoryTaskQueue) -- thread-safe record
//!   store and executable registry using `DashMap`. In
//!   [`ExecutionMode::Eager`] it runs each task while it is being queued; in
//!   [`ExecutionMode::Deferred`] it only stores it.
//! - [`Worker`](worker::Worker) -- drains pending records of a deferred
//!   queue, either on demand or from a background Tokio task.
//!
//! Database or broker backed queues implement the same trait elsewhere.

pub mod memory;
pub mod worker;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

pub use memory::InMemoryTaskQueue;
pub use worker::{Worker, WorkerHandle};

/// When the in-memory queue runs a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run the task inside `queue`/`aqueue`, before they return.
    #[default]
    Eager,
    /// Store the task; a [`Worker`] runs it later.
    Deferred,
}

/// Configuration for [`InMemoryTaskQueue`] and its [`Worker`].
///
/// # Defaults
///
/// | Setting              | Default | Description                          |
/// |----------------------|---------|--------------------------------------|
/// | `mode`               | `eager` | When queued tasks run                |
/// | `max_records`        | none    | Cap on stored records (any state)    |
/// | `worker_interval_ms` | 100     | Idle sleep between worker passes     |
///
/// # Examples
///
/// ```
/// use quesadilla::store::{ExecutionMode, QueueConfig};
///
/// let config = QueueConfig::from_toml(r#"
///     mode = "deferred"
///     max_records = 500
/// "#).unwrap();
/// assert_eq!(config.mode, ExecutionMode::Deferred);
/// assert_eq!(config.max_records, Some(500));
/// assert_eq!(config.worker_interval_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// When queued tasks run.
    pub mode: ExecutionMode,

    /// Maximum number of records the queue holds. `None` means unbounded.
    pub max_records: Option<usize>,

    /// Sleep between passes of a spawned [`Worker`], in milliseconds.
    pub worker_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Eager,
            max_records: None,
            worker_interval_ms: 100,
        }
    }
}

impl QueueConfig {
    /// Default configuration, executing tasks as they are queued.
    pub fn eager() -> Self {
        Self::default()
    }

    /// Default configuration, leaving execution to a [`Worker`].
    pub fn deferred() -> Self {
        Self {
            mode: ExecutionMode::Deferred,
            ..Self::default()
        }
    }

    /// Caps the number of stored records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Sets the worker's idle interval.
    pub fn with_worker_interval(mut self, interval: Duration) -> Self {
        self.worker_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The worker's idle interval.
    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms)
    }

    /// Parses configuration from a TOML string. Missing keys take their
    /// default values.
    ///
    /// # Errors
    ///
    /// [`TaskError::Config`] on malformed TOML or unknown values.
    pub fn from_toml(content: &str) -> Result<Self, TaskError> {
        toml::from_str(content).map_err(|e| TaskError::Config(e.to_string()))
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`TaskError::Config`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }
}

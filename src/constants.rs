//! Shared constants for polling and failure classification.

use std::time::Duration;

/// Interval between polls used by [`QueuedTask::wait`](crate::QueuedTask::wait)
/// and [`QueuedTask::await_completion`](crate::QueuedTask::await_completion).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failure kind recorded when an executable panics.
pub const PANIC_FAILURE_KIND: &str = "panic";

/// Failure kind recorded when the captured arguments do not fit the
/// executable's argument type.
pub const INVALID_ARGUMENTS_KIND: &str = "invalid_arguments";

/// Failure kind recorded when an executable's output cannot be serialized.
pub const INVALID_OUTPUT_KIND: &str = "invalid_output";

/// Failure kind recorded when no Tokio runtime could be set up to drive an
/// async executable from blocking code.
pub const RUNTIME_UNAVAILABLE_KIND: &str = "runtime_unavailable";

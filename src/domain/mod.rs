//! Domain types describing one queued task instance.
//!
//! These are plain data: the captured arguments ([`TaskExecutionContext`]),
//! the outcome ([`TaskExecutionResult`]), and the lifecycle record
//! ([`BaseTaskMetadata`]) together with its type-erased storage form
//! ([`GenericQueuedTask`]). Nothing in here talks to a queue.

pub mod context;
pub mod id;
pub mod metadata;
pub mod result;

pub use context::*;
pub use id::*;
pub use metadata::*;
pub use result::*;

//! Queue a few additions on a deferred in-memory queue and let a background
//! worker run them.
//!
//! Run with: `RUST_LOG=quesadilla=debug cargo run --example add_numbers`

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use quesadilla::store::memory::InMemoryTaskQueue;
use quesadilla::store::{QueueConfig, Worker};
use quesadilla::{async_task, sync_task, TaskExecutionResult};

#[derive(Debug, thiserror::Error)]
#[error("refusing to add negative numbers: {0}")]
struct NegativeInput(i64);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quesadilla::logging::init();

    let config = QueueConfig::deferred().with_worker_interval(Duration::from_millis(20));
    let interval = config.worker_interval();
    let queue = Arc::new(InMemoryTaskQueue::new().with_config(config));

    let add = sync_task(queue.clone(), "add", |(a, b): (i64, i64)| {
        if a < 0 || b < 0 {
            return Err(NegativeInput(a.min(b)));
        }
        Ok(a + b)
    })?;
    let slow_add = async_task(queue.clone(), "slow_add", |(a, b): (i64, i64)| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, Infallible>(a + b)
    })?;

    let worker = Worker::new(queue.clone()).spawn(interval);

    let first = add.aqueue((2, 3)).await?;
    let second = add.aqueue((-1, 3)).await?;
    let third = slow_add.aqueue((40, 2)).await?;
    println!("queued {} tasks, {} pending", queue.len(), queue.pending_ids().len());

    for done in [first.await_completion().await?, second.await_completion().await?] {
        match done.result() {
            Some(TaskExecutionResult::Success(sum)) => println!("{} -> {sum}", done.id()),
            Some(TaskExecutionResult::Failure(failure)) => {
                println!("{} failed: {}", done.id(), failure.message)
            },
            None => unreachable!("await_completion returns finalized tasks"),
        }
    }

    let third = third.await_completion().await?;
    if let Some(found) = slow_add.afind(third.id().as_str()).await? {
        println!("found {} again: {:?}", found.id(), found.result());
    }

    worker.shutdown().await;
    Ok(())
}

//! Fan-out utilities for running independent tasks concurrently

use futures::{stream::FuturesUnordered, Future, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Context provided to each task in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    /// Phase number (for logging)
    pub phase: usize,
    /// Task number (1-indexed for display)
    pub task_number: usize,
    /// Total number of tasks in this batch
    pub total_tasks: usize,
}

impl TaskContext {
    /// 0-based position of the item in the input
    pub fn index(&self) -> usize {
        self.task_number - 1
    }
}

/// Run every item to completion with at most `max_concurrent` in flight.
///
/// Results come back in completion order (not input order), each paired with
/// its context. A failing task never cancels the others; callers decide what
/// a failure means once the whole batch has settled.
///
/// # Example
/// ```rust,ignore
/// let settled = execute_batch(3, analysts, 2, |analyst, ctx| async move {
///     runner.run(InterviewState::new(analyst, &topic, turns), &ctx.task_number.to_string()).await
/// })
/// .await;
/// ```
pub async fn execute_batch<T, F, Fut, R, E>(
    phase: usize,
    items: Vec<T>,
    max_concurrent: usize,
    task_executor: F,
) -> Vec<(TaskContext, Result<R, E>)>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let executor = Arc::new(task_executor);
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let executor = executor.clone();

        let ctx = TaskContext {
            phase,
            task_number: idx + 1,
            total_tasks: total,
        };

        tasks.push(async move {
            // The semaphore is never closed, so a permit is always granted
            let _permit = sem.acquire().await.ok();
            (ctx, executor(item, ctx).await)
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(settled) = tasks.next().await {
        results.push(settled);
    }

    results
}

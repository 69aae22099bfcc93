//! Bounded fan-out over async tasks.

use std::future::Future;

use futures_util::stream::{self, StreamExt, TryStreamExt};

/// Runs `task` for every item with at most `limit` futures in flight.
///
/// A slot is refilled as soon as any task finishes. Results come back in
/// completion order. The first error is returned and every task still in
/// flight is dropped. A `limit` of zero is treated as one.
pub async fn run_bounded<I, T, R, E, F, Fut>(items: I, limit: usize, task: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(limit.max(1))
        .try_collect()
        .await
}

/// [`run_bounded`] for tasks that produce no value.
pub async fn run_each<I, T, E, F, Fut>(items: I, limit: usize, task: F) -> Result<(), E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(limit.max(1))
        .try_for_each(|_| async { Ok(()) })
        .await
}

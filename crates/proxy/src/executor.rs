//! Bounded-concurrency batch execution
//!
//! Operations are interleaved on the calling task; at most `limit` of them
//! are polled at any time and the rest wait their turn.

use futures::future::BoxFuture;
use futures::{stream, StreamExt, TryStreamExt};
use std::future::Future;
use tokio::task::JoinHandle;

/// Default ceiling for simultaneous backend calls
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedExecutor {
    limit: usize,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BoundedExecutor {
    /// A ceiling of zero is treated as one
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every operation; results come back in completion order, each
    /// tagged with its key
    pub async fn run_all<K, T, E, F, Fut, I>(&self, ops: I) -> Vec<(K, Result<T, E>)>
    where
        I: IntoIterator<Item = (K, F)>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(ops)
            .map(|(key, op)| async move { (key, op().await) })
            .buffer_unordered(self.limit)
            .collect()
            .await
    }

    /// Run operations until the first failure
    ///
    /// On failure, in-flight operations are dropped and queued ones never
    /// start.
    pub async fn try_run_all<K, T, E, F, Fut, I>(&self, ops: I) -> Result<Vec<(K, T)>, E>
    where
        I: IntoIterator<Item = (K, F)>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(ops)
            .map(|(key, op)| async move { op().await.map(|value| (key, value)) })
            .buffer_unordered(self.limit)
            .try_collect()
            .await
    }

    /// Drive already-started operations on a detached task
    ///
    /// The operations are boxed before spawning so the task holds no
    /// borrowed closures. Dropping the handle leaves them running.
    pub fn spawn_all<K, T>(&self, ops: Vec<(K, BoxFuture<'static, T>)>) -> JoinHandle<Vec<(K, T)>>
    where
        K: Send + 'static,
        T: Send + 'static,
    {
        let tagged: Vec<BoxFuture<'static, (K, T)>> = ops
            .into_iter()
            .map(|(key, op)| -> BoxFuture<'static, (K, T)> { Box::pin(async move { (key, op.await) }) })
            .collect();

        let limit = self.limit;
        tokio::spawn(async move { stream::iter(tagged).buffer_unordered(limit).collect().await })
    }
}

//! Paced execution of per-item remote calls.

use crate::{BatchSettings, SyncError, SyncResult};
use futures::future::join_all;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Runs work in fixed-size concurrent batches with a pause between batches.
///
/// Every future of a batch is awaited before the next batch starts, so a
/// slow item holds back the rest. The pause is skipped after the last batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    settings: BatchSettings,
}

impl BatchScheduler {
    pub fn new(settings: BatchSettings) -> Self {
        Self { settings }
    }

    /// Applies `f` to every item and returns the outputs in input order.
    ///
    /// # Errors
    /// Returns `SyncError::Cancelled` if `cancel` fires between batches or
    /// during a pause. A batch already in flight is allowed to finish; its
    /// futures are expected to observe the token themselves.
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        mut f: F,
    ) -> SyncResult<Vec<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let size = self.settings.size.get();
        let mut results = Vec::with_capacity(items.len());
        let mut pending = items.into_iter().peekable();
        let mut batch = 0usize;

        while pending.peek().is_some() {
            if batch > 0 && !self.settings.interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let futures: Vec<Fut> = pending.by_ref().take(size).map(&mut f).collect();
            tracing::trace!(batch, calls = futures.len(), "dispatching batch");
            results.extend(join_all(futures).await);
            batch += 1;
        }

        Ok(results)
    }
}

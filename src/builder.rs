//! Builder pattern for configuring a single read.

use crate::error::Result;
use crate::key::CacheKey;
use crate::query::QueryExecutor;
use crate::store::CacheValue;
use crate::strategy::CacheStrategy;
use std::future::Future;
use std::time::Duration;

/// Fluent builder for one read.
///
/// Defaults to the executor's strategy and to the store policy's freshness
/// window for the key.
///
/// # Example
///
/// ```ignore
/// let posts = executor
///     .builder(CacheKeyBuilder::collection())
///     .with_strategy(CacheStrategy::Refresh)
///     .with_freshness(Duration::from_secs(30))
///     .execute(move || async move { remote.fetch_collection().await.map(CacheValue::Collection) })
///     .await?;
/// ```
pub struct ReadOperationBuilder<'a> {
    executor: &'a QueryExecutor,
    key: CacheKey,
    strategy: CacheStrategy,
    freshness_window: Option<Duration>,
}

impl<'a> ReadOperationBuilder<'a> {
    pub(crate) fn new(executor: &'a QueryExecutor, key: CacheKey) -> Self {
        let freshness_window = executor.store().policy().window_for(&key);
        Self {
            executor,
            key,
            strategy: executor.strategy(),
            freshness_window,
        }
    }

    /// Set the read strategy.
    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the freshness window for this read.
    pub fn with_freshness(mut self, window: Duration) -> Self {
        self.freshness_window = Some(window);
        self
    }

    /// Treat the entry as fresh until it is explicitly invalidated.
    pub fn until_invalidated(mut self) -> Self {
        self.freshness_window = None;
        self
    }

    /// Run the read.
    ///
    /// # Errors
    ///
    /// Same as [`QueryExecutor::read_with`].
    pub async fn execute<F, Fut>(self, fetcher: F) -> Result<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send + 'static,
    {
        self.executor
            .read_with(self.key, fetcher, self.freshness_window, self.strategy)
            .await
    }
}

//! Query executor - serves reads from the store and fetches when required.

use crate::builder::ReadOperationBuilder;
use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::store::{CacheStore, CacheValue};
use crate::strategy::CacheStrategy;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type FetchChannel = Shared<BoxFuture<'static, Result<CacheValue>>>;

/// Orchestrates reads of a single key.
///
/// Concurrent reads of the same key that need the remote service share one
/// fetch. Fetches run as spawned tasks, so a reader that gives up waiting
/// does not cancel the fetch and its result still lands in the store.
///
/// # Example
///
/// ```ignore
/// let executor = QueryExecutor::new(store.clone());
/// let posts = executor
///     .read(
///         CacheKeyBuilder::collection(),
///         move || async move { remote.fetch_collection().await.map(CacheValue::Collection) },
///         Some(Duration::from_secs(60)),
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryExecutor {
    store: CacheStore,
    in_flight: Arc<DashMap<CacheKey, FetchChannel>>,
    metrics: Arc<dyn CacheMetrics>,
    strategy: CacheStrategy,
}

impl QueryExecutor {
    pub fn new(store: CacheStore) -> Self {
        QueryExecutor {
            store,
            in_flight: Arc::new(DashMap::new()),
            metrics: Arc::new(NoOpMetrics),
            strategy: CacheStrategy::default(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Strategy used by [`read`](Self::read).
    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Configure a single read fluently.
    pub fn builder(&self, key: CacheKey) -> ReadOperationBuilder<'_> {
        ReadOperationBuilder::new(self, key)
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// Whether a fetch for `key` is outstanding.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Read `key` with the executor's strategy.
    ///
    /// `fetcher` is only called when the remote service has to be asked and
    /// no fetch for `key` is already in flight. A successful fetch is stored
    /// with `freshness_window`; a failed one leaves the entry untouched.
    ///
    /// # Errors
    ///
    /// - Any error returned by the fetch, unchanged
    /// - `Error::NotFound`: `CacheOnly` strategy and nothing cached
    pub async fn read<F, Fut>(
        &self,
        key: CacheKey,
        fetcher: F,
        freshness_window: Option<Duration>,
    ) -> Result<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send + 'static,
    {
        self.read_with(key, fetcher, freshness_window, self.strategy)
            .await
    }

    /// Read `key` with an explicit strategy.
    pub async fn read_with<F, Fut>(
        &self,
        key: CacheKey,
        fetcher: F,
        freshness_window: Option<Duration>,
        strategy: CacheStrategy,
    ) -> Result<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send + 'static,
    {
        let timer = Instant::now();

        debug!("» Read {} (strategy: {})", key, strategy);

        if strategy != CacheStrategy::Bypass {
            match self.store.get(&key) {
                Some(entry) => {
                    if entry.is_fresh_within(Instant::now(), freshness_window)
                        || strategy == CacheStrategy::CacheOnly
                    {
                        debug!("✓ Cache hit for {}", key);
                        self.metrics.record_hit(&key, timer.elapsed());
                        return Ok(entry.value);
                    }

                    if entry.is_invalidated() && strategy == CacheStrategy::StaleWhileRevalidate {
                        // The returned channel is dropped; the spawned fetch keeps running.
                        drop(self.fetch(key.clone(), fetcher, freshness_window));
                        debug!("✓ Serving invalidated {} while revalidating", key);
                        self.metrics.record_stale_served(&key);
                        return Ok(entry.value);
                    }

                    debug!("✗ Stale entry for {}, refetching", key);
                }
                None if strategy == CacheStrategy::CacheOnly => {
                    debug!("✗ Cache miss for {} (CacheOnly) - no fallback", key);
                    self.metrics.record_miss(&key, timer.elapsed());
                    return Err(Error::NotFound(key.to_string()));
                }
                None => debug!("✗ Cache miss for {}", key),
            }
        }

        match self.fetch(key.clone(), fetcher, freshness_window).await {
            Ok(value) => {
                self.metrics.record_miss(&key, timer.elapsed());
                info!("✓ Read {} from remote in {:?}", key, timer.elapsed());
                Ok(value)
            }
            Err(e) => {
                self.metrics.record_error(&key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for the fetch currently in flight for `key`, if any.
    pub async fn settle(&self, key: &CacheKey) -> Option<Result<CacheValue>> {
        let channel = self
            .in_flight
            .get(key)
            .map(|entry| entry.value().clone())?;
        Some(channel.await)
    }

    /// Join the in-flight fetch for `key` or start a new one.
    ///
    /// Not `async`: the fetch is spawned eagerly, whether or not the caller
    /// awaits the returned channel. Neither `fetcher` nor the spawn runs
    /// while a lock on the in-flight table is held.
    fn fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetcher: F,
        freshness_window: Option<Duration>,
    ) -> FetchChannel
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send + 'static,
    {
        if let Some(channel) = self.join(&key) {
            return channel;
        }

        let future = fetcher();
        let (sender, receiver) = oneshot::channel();
        let channel: FetchChannel = receiver
            .map(|received| {
                received.unwrap_or_else(|_cancelled| Err(Error::transport("fetch task dropped")))
            })
            .boxed()
            .shared();

        // Another reader may have started a fetch while `fetcher` ran.
        let claimed = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => Err(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(channel.clone());
                Ok(())
            }
        };
        if let Err(existing) = claimed {
            debug!("✓ Joined in-flight fetch for {}", key);
            self.metrics.record_dedup(&key);
            return existing;
        }

        self.metrics.record_fetch(&key);
        self.spawn_fetch(key, future, freshness_window, sender);
        channel
    }

    fn join(&self, key: &CacheKey) -> Option<FetchChannel> {
        let channel = self.in_flight.get(key).map(|entry| entry.value().clone())?;
        debug!("✓ Joined in-flight fetch for {}", key);
        self.metrics.record_dedup(key);
        Some(channel)
    }

    fn spawn_fetch<Fut>(
        &self,
        key: CacheKey,
        future: Fut,
        freshness_window: Option<Duration>,
        sender: oneshot::Sender<Result<CacheValue>>,
    ) where
        Fut: Future<Output = Result<CacheValue>> + Send + 'static,
    {
        let store = self.store.clone();
        let generation = store.track(&key);
        let release = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        tokio::spawn(async move {
            let result = future.await;
            match &result {
                Ok(value) => {
                    let cached = store.set_if_unchanged(
                        key.clone(),
                        value.clone(),
                        freshness_window,
                        generation,
                    );
                    if !cached {
                        debug!("⚠ Fetch for {} overtaken by a write, result not cached", key);
                    }
                }
                Err(e) => warn!("✗ Fetch for {} failed: {}", key, e),
            }
            // Release only after the store write.
            drop(release);
            sender.send(result).ok();
        });
    }
}

/// Removes a key from the in-flight table when dropped, including when the
/// fetch panics or its task is dropped unpolled.
struct InFlightGuard {
    in_flight: Arc<DashMap<CacheKey, FetchChannel>>,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

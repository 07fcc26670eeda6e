//! Metrics hooks for cache reads and mutation cascades.

use crate::key::CacheKey;
use crate::mutation::MutationKind;
use std::time::Duration;

/// Receives cache events. Every method defaults to a no-op so
/// implementations only override what they track.
pub trait CacheMetrics: Send + Sync {
    /// Read served from a fresh entry.
    fn record_hit(&self, _key: &CacheKey, _duration: Duration) {}

    /// Read that had to wait for the remote service.
    fn record_miss(&self, _key: &CacheKey, _duration: Duration) {}

    /// Read that joined a fetch already in flight for the same key.
    fn record_dedup(&self, _key: &CacheKey) {}

    /// Read answered with an invalidated value while a refetch runs.
    fn record_stale_served(&self, _key: &CacheKey) {}

    /// Remote fetch started for `key`.
    fn record_fetch(&self, _key: &CacheKey) {}

    fn record_error(&self, _key: &CacheKey, _error: &str) {}

    /// A successful mutation reconciled the store.
    fn record_cascade(&self, _kind: MutationKind, _written: usize, _invalidated: usize) {}
}

/// Default metrics sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

//! Process-wide keyed store of cached views.
//!
//! The store has no networking knowledge. Every operation is synchronous and
//! runs under the store's lock, so a reader never observes a half-applied
//! write. Multi-key cascades go through [`CacheStore::batch`], which applies
//! all of its writes under a single lock acquisition.
//!
//! Every write to a key, whether or not an entry exists, bumps that key's
//! generation. A fetch records the generation when it starts and only
//! lands through [`CacheStore::set_if_unchanged`], so a result that was
//! overtaken by a mutation cannot overwrite the mutation's effect.

use crate::config::FreshnessPolicy;
use crate::entity::{Identifier, Post, User};
use crate::error::{Error, Result};
use crate::key::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// A cached view's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheValue {
    Entity(Post),
    Collection(Vec<Post>),
    Users(Vec<User>),
}

impl CacheValue {
    pub fn as_posts(&self) -> Option<&[Post]> {
        match self {
            CacheValue::Collection(posts) => Some(posts),
            _ => None,
        }
    }

    pub fn into_post(self) -> Result<Post> {
        match self {
            CacheValue::Entity(post) => Ok(post),
            other => Err(Error::InvalidCacheEntry(format!(
                "expected a post, found {}",
                other.shape()
            ))),
        }
    }

    pub fn into_posts(self) -> Result<Vec<Post>> {
        match self {
            CacheValue::Collection(posts) => Ok(posts),
            other => Err(Error::InvalidCacheEntry(format!(
                "expected a post collection, found {}",
                other.shape()
            ))),
        }
    }

    pub fn into_users(self) -> Result<Vec<User>> {
        match self {
            CacheValue::Users(users) => Ok(users),
            other => Err(Error::InvalidCacheEntry(format!(
                "expected a user collection, found {}",
                other.shape()
            ))),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            CacheValue::Entity(_) => "a post",
            CacheValue::Collection(_) => "a post collection",
            CacheValue::Users(_) => "a user collection",
        }
    }
}

/// One cached view.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: CacheValue,
    /// `None` once the entry has been invalidated.
    pub fetched_at: Option<Instant>,
    /// `None` keeps the entry fresh until it is invalidated.
    pub freshness_window: Option<Duration>,
}

impl CacheEntry {
    pub fn is_invalidated(&self) -> bool {
        self.fetched_at.is_none()
    }

    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.is_fresh_within(now, self.freshness_window)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }

    /// Freshness judged against a caller-supplied window instead of the
    /// window recorded with the entry.
    pub fn is_fresh_within(&self, now: Instant, window: Option<Duration>) -> bool {
        match (self.fetched_at, window) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(fetched_at), Some(window)) => now.saturating_duration_since(fetched_at) < window,
        }
    }
}

/// Shared handle to the cache. Clones point at the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    policy: FreshnessPolicy,
    epoch: Instant,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    generations: HashMap<CacheKey, u64>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Empty store using the default freshness policy.
    pub fn new() -> Self {
        Self::with_policy(FreshnessPolicy::default())
    }

    pub fn with_policy(policy: FreshnessPolicy) -> Self {
        CacheStore {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState::default()),
                policy,
                epoch: Instant::now(),
            }),
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.inner.policy
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.read_entries(|entries| entries.get(key).cloned())
    }

    /// Replace the value at `key` and stamp it fresh, using the policy's window.
    pub fn set(&self, key: CacheKey, value: CacheValue) {
        self.batch(|tx| tx.set(key, value));
    }

    /// Replace the value at `key` with an explicit freshness window.
    pub fn set_with_window(&self, key: CacheKey, value: CacheValue, window: Option<Duration>) {
        self.batch(|tx| tx.set_with_window(key, value, window));
    }

    /// Apply `transform` to the post collection at `key`.
    ///
    /// Returns `false` without calling `transform` when `key` holds no
    /// post collection.
    pub fn patch_collection<F>(&self, key: &CacheKey, transform: F) -> bool
    where
        F: FnOnce(Vec<Post>) -> Vec<Post>,
    {
        self.batch(|tx| tx.patch_collection(key, transform))
    }

    /// Mark the entry stale while keeping its value.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.batch(|tx| tx.invalidate(key))
    }

    /// Invalidate every entry whose key matches `predicate`.
    pub fn invalidate_where<P>(&self, predicate: P) -> Vec<CacheKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        self.batch(|tx| tx.invalidate_where(predicate))
    }

    /// Remove the entry entirely.
    pub fn evict(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.batch(|tx| tx.evict(key))
    }

    /// Start tracking writes to `key` and return its current generation.
    pub fn track(&self, key: &CacheKey) -> u64 {
        self.batch(|tx| tx.track(key))
    }

    /// Store a fetched value unless `key` was written since `generation`
    /// was taken with [`track`](Self::track).
    ///
    /// Returns `false` and leaves the store untouched when the fetch was
    /// overtaken.
    pub fn set_if_unchanged(
        &self,
        key: CacheKey,
        value: CacheValue,
        window: Option<Duration>,
        generation: u64,
    ) -> bool {
        self.batch(|tx| {
            if tx.generation(&key) != generation {
                debug!("✗ SET {} skipped: written since the fetch started", key);
                return false;
            }
            tx.set_with_window(key, value, window);
            true
        })
    }

    /// Run several writes as one atomic step.
    ///
    /// Readers see either none or all of the batch's writes.
    pub fn batch<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut StoreBatch<'_>) -> R,
    {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut tx = StoreBatch {
            state: &mut *state,
            policy: &self.inner.policy,
            now: Instant::now(),
        };
        f(&mut tx)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read_entries(|entries| entries.contains_key(key))
    }

    /// All cached keys in ascending order.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys = self.read_entries(|entries| entries.keys().cloned().collect::<Vec<_>>());
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.batch(|tx| {
            tx.state.entries.clear();
            for generation in tx.state.generations.values_mut() {
                *generation += 1;
            }
        });
        warn!("⚠ Cache store cleared");
    }

    /// Every cached copy of post `id`, keyed by the view holding it.
    pub fn entity_copies(&self, id: Identifier) -> Vec<(CacheKey, Post)> {
        let mut copies = self.read_entries(|entries| {
            let mut copies = Vec::new();
            for (key, entry) in entries.iter() {
                match &entry.value {
                    CacheValue::Entity(post) if post.id == id => {
                        copies.push((key.clone(), post.clone()))
                    }
                    CacheValue::Collection(posts) => copies.extend(
                        posts
                            .iter()
                            .filter(|post| post.id == id)
                            .map(|post| (key.clone(), post.clone())),
                    ),
                    _ => {}
                }
            }
            copies
        });
        copies.sort_by(|a, b| a.0.cmp(&b.0));
        copies
    }

    /// Deterministic encoding of the whole store.
    ///
    /// Entries are ordered by key and fetch stamps are recorded as offsets
    /// from the store's creation, so two snapshots are byte-equal exactly
    /// when the stores hold the same values, stamps and windows.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut rows: Vec<SnapshotRow> = self.read_entries(|entries| {
            entries
                .iter()
                .map(|(key, entry)| SnapshotRow {
                    key: key.clone(),
                    value: entry.value.clone(),
                    fetched_at: entry
                        .fetched_at
                        .map(|at| at.saturating_duration_since(self.inner.epoch)),
                    freshness_window: entry.freshness_window,
                })
                .collect()
        });
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        crate::serialization::serialize_for_cache(&rows)
    }

    fn read_entries<R>(&self, f: impl FnOnce(&HashMap<CacheKey, CacheEntry>) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state.entries)
    }
}

#[derive(Serialize)]
struct SnapshotRow {
    key: CacheKey,
    value: CacheValue,
    fetched_at: Option<Duration>,
    freshness_window: Option<Duration>,
}

/// Write access to the store for the duration of one [`CacheStore::batch`].
pub struct StoreBatch<'a> {
    state: &'a mut StoreState,
    policy: &'a FreshnessPolicy,
    now: Instant,
}

impl StoreBatch<'_> {
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.state.entries.get(key)
    }

    /// Current generation of `key`; `0` if it was never written.
    pub fn generation(&self, key: &CacheKey) -> u64 {
        self.state.generations.get(key).copied().unwrap_or(0)
    }

    fn track(&mut self, key: &CacheKey) -> u64 {
        *self.state.generations.entry(key.clone()).or_insert(0)
    }

    fn bump(&mut self, key: &CacheKey) {
        *self.state.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub fn set(&mut self, key: CacheKey, value: CacheValue) {
        let window = self.policy.window_for(&key);
        self.set_with_window(key, value, window);
    }

    pub fn set_with_window(&mut self, key: CacheKey, value: CacheValue, window: Option<Duration>) {
        debug!("✓ SET {}", key);
        self.bump(&key);
        self.state.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Some(self.now),
                freshness_window: window,
            },
        );
    }

    pub fn patch_collection<F>(&mut self, key: &CacheKey, transform: F) -> bool
    where
        F: FnOnce(Vec<Post>) -> Vec<Post>,
    {
        self.bump(key);
        match self.state.entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                CacheValue::Collection(posts) => {
                    let current = std::mem::take(posts);
                    *posts = transform(current);
                    debug!("✓ PATCH {} ({} posts)", key, posts.len());
                    true
                }
                _ => {
                    debug!("✗ PATCH {} skipped: not a post collection", key);
                    false
                }
            },
            None => {
                debug!("✗ PATCH {} skipped: not cached", key);
                false
            }
        }
    }

    /// Mark `key` stale. An in-flight fetch of `key` is kept from landing
    /// even when nothing is cached yet.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.bump(key);
        match self.state.entries.get_mut(key) {
            Some(entry) => {
                entry.fetched_at = None;
                debug!("✓ INVALIDATE {}", key);
                true
            }
            None => false,
        }
    }

    pub fn invalidate_where<P>(&mut self, predicate: P) -> Vec<CacheKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        for (key, generation) in self.state.generations.iter_mut() {
            if predicate(key) {
                *generation += 1;
            }
        }

        let mut invalidated = Vec::new();
        for (key, entry) in self.state.entries.iter_mut() {
            if predicate(key) {
                entry.fetched_at = None;
                invalidated.push(key.clone());
            }
        }
        invalidated.sort();
        for key in &invalidated {
            debug!("✓ INVALIDATE {}", key);
        }
        invalidated
    }

    pub fn evict(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.bump(key);
        let removed = self.state.entries.remove(key);
        if removed.is_some() {
            debug!("✓ EVICT {}", key);
        }
        removed
    }

    /// Keys of cached post collections that satisfy `predicate`.
    pub fn collection_keys_where<P>(&self, predicate: P) -> Vec<CacheKey>
    where
        P: Fn(&CacheKey, &[Post]) -> bool,
    {
        let mut keys: Vec<CacheKey> = self
            .state
            .entries
            .iter()
            .filter_map(|(key, entry)| match &entry.value {
                CacheValue::Collection(posts) if predicate(key, posts) => Some(key.clone()),
                _ => None,
            })
            .collect();
        keys.sort();
        keys
    }
}

//! High-level service facade for the posts/users domain.
//!
//! Wires one [`CacheStore`], a [`QueryExecutor`], a [`MutationExecutor`] and
//! the remote client together so callers deal with typed posts and users
//! instead of keys and cache values.

use crate::config::SyncConfig;
use crate::entity::{Identifier, Post, PostDraft, User};
use crate::error::Result;
use crate::key::{CacheKey, CacheKeyBuilder};
use crate::mutation::{MutationExecutor, MutationKind, MutationTarget};
use crate::observability::CacheMetrics;
use crate::query::QueryExecutor;
use crate::repository::RemoteServiceClient;
use crate::store::{CacheStore, CacheValue};
use std::sync::Arc;

/// Cached access to posts and users.
///
/// Clones share the store, the in-flight fetch table and the pending
/// mutation table.
///
/// # Example
///
/// ```ignore
/// let service = CacheService::with_config(remote, SyncConfig::from_env());
///
/// let posts = service.posts().await?;
/// let mine = service.posts_by_owner(1).await?;
///
/// let created = service.submit_post(PostDraft::new(1, "Title", "Long enough body")).await?;
/// service.delete_post(created.id, Some(created.owner_id)).await?;
/// ```
pub struct CacheService<C: RemoteServiceClient> {
    client: Arc<C>,
    queries: QueryExecutor,
    mutations: MutationExecutor<C>,
    config: SyncConfig,
}

impl<C: RemoteServiceClient> Clone for CacheService<C> {
    fn clone(&self) -> Self {
        CacheService {
            client: Arc::clone(&self.client),
            queries: self.queries.clone(),
            mutations: self.mutations.clone(),
            config: self.config,
        }
    }
}

impl<C: RemoteServiceClient> CacheService<C> {
    /// Service with the default configuration.
    pub fn new(client: C) -> Self {
        Self::with_config(client, SyncConfig::default())
    }

    pub fn with_config(client: C, config: SyncConfig) -> Self {
        let client = Arc::new(client);
        let store = CacheStore::with_policy(config.freshness);
        info!(
            "✓ Cache service ready (strategy: {}, collection freshness: {:?})",
            config.strategy, config.freshness.collection
        );
        CacheService {
            queries: QueryExecutor::new(store.clone()).with_strategy(config.strategy),
            mutations: MutationExecutor::new(store, Arc::clone(&client)),
            client,
            config,
        }
    }

    /// Set custom metrics handler for reads and mutations.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.queries = self.queries.with_metrics(Arc::clone(&metrics));
        self.mutations = self.mutations.with_metrics(metrics);
        self
    }

    pub fn store(&self) -> &CacheStore {
        self.queries.store()
    }

    pub fn queries(&self) -> &QueryExecutor {
        &self.queries
    }

    pub fn mutations(&self) -> &MutationExecutor<C> {
        &self.mutations
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// The global post collection.
    pub async fn posts(&self) -> Result<Vec<Post>> {
        let client = Arc::clone(&self.client);
        self.queries
            .builder(CacheKeyBuilder::collection())
            .execute(move || async move {
                client.fetch_collection().await.map(CacheValue::Collection)
            })
            .await?
            .into_posts()
    }

    /// Posts owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: non-positive `owner_id`
    /// - Any remote failure
    pub async fn posts_by_owner(&self, owner_id: Identifier) -> Result<Vec<Post>> {
        let key = CacheKeyBuilder::owner_collection(owner_id)?;
        let client = Arc::clone(&self.client);
        self.queries
            .builder(key)
            .execute(move || async move {
                client
                    .fetch_owner_collection(owner_id)
                    .await
                    .map(CacheValue::Collection)
            })
            .await?
            .into_posts()
    }

    /// A single post.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound`: the post does not exist remotely
    /// - Any other remote failure
    pub async fn post(&self, id: Identifier) -> Result<Post> {
        let client = Arc::clone(&self.client);
        self.queries
            .builder(CacheKeyBuilder::entity(id))
            .execute(move || async move { client.fetch_entity(id).await.map(CacheValue::Entity) })
            .await?
            .into_post()
    }

    /// Every user.
    pub async fn users(&self) -> Result<Vec<User>> {
        let client = Arc::clone(&self.client);
        self.queries
            .builder(CacheKeyBuilder::users())
            .execute(move || async move { client.fetch_users().await.map(CacheValue::Users) })
            .await?
            .into_users()
    }

    /// Create a post without form validation.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post> {
        self.mutations.create(draft).await
    }

    /// Validate a draft against the form rules, then create it.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: every failed form rule (no remote call made)
    /// - Anything [`MutationExecutor::create`] returns
    pub async fn submit_post(&self, draft: PostDraft) -> Result<Post> {
        draft.validate_form()?;
        self.mutations.create(draft).await
    }

    pub async fn update_post(&self, post: Post) -> Result<Post> {
        self.mutations.update(post).await
    }

    /// Delete a post. Pass the owner when known to avoid invalidating every
    /// cached owner collection.
    pub async fn delete_post(&self, id: Identifier, prior_owner: Option<Identifier>) -> Result<()> {
        self.mutations.delete_owned(id, prior_owner).await
    }

    /// Mark one view stale. Returns `false` when `key` is not cached.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store().invalidate(key)
    }

    pub fn is_pending(&self, kind: MutationKind, target: &MutationTarget) -> bool {
        self.mutations.is_pending(kind, target)
    }
}

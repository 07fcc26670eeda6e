//! Mutation executor - create, update and delete with cache reconciliation.
//!
//! Every mutation is two-phase:
//!
//! 1. Delegate to the remote service. No cache state changes while waiting.
//! 2. On success, apply the write-through and invalidation cascade in one
//!    [`CacheStore::batch`]. On failure, touch nothing and return the error.
//!
//! Only confirmed results are written; there are no optimistic writes and
//! therefore nothing to roll back.

use crate::entity::{CacheEntity, Identifier, Post, PostDraft};
use crate::error::{Error, Result};
use crate::key::{CacheKey, CacheKeyBuilder};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::repository::RemoteServiceClient;
use crate::store::{CacheStore, CacheValue, StoreBatch};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// What a mutation acts on.
///
/// Creates are keyed by their payload, so submitting the same draft twice
/// while the first submission is pending is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Draft(PostDraft),
    Post(Identifier),
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::Draft(draft) => {
                write!(f, "draft {:?} for owner {}", draft.title, draft.owner_id)
            }
            MutationTarget::Post(id) => write!(f, "post {}", id),
        }
    }
}

/// A pending mutation. Lives only until the mutation settles.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: MutationTarget,
    pub started_at: Instant,
}

type PendingMap = DashMap<(MutationKind, MutationTarget), MutationRecord>;

/// Removes its slot from the pending table when dropped, whether the
/// mutation succeeded, failed or was abandoned.
struct PendingGuard {
    pending: Arc<PendingMap>,
    slot: (MutationKind, MutationTarget),
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.slot);
    }
}

/// Runs mutations against the remote service and reconciles every cached
/// view they touch.
pub struct MutationExecutor<C: RemoteServiceClient> {
    store: CacheStore,
    client: Arc<C>,
    pending: Arc<PendingMap>,
    metrics: Arc<dyn CacheMetrics>,
}

impl<C: RemoteServiceClient> Clone for MutationExecutor<C> {
    fn clone(&self) -> Self {
        MutationExecutor {
            store: self.store.clone(),
            client: Arc::clone(&self.client),
            pending: Arc::clone(&self.pending),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<C: RemoteServiceClient> MutationExecutor<C> {
    pub fn new(store: CacheStore, client: Arc<C>) -> Self {
        MutationExecutor {
            store,
            client,
            pending: Arc::new(DashMap::new()),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Whether a mutation of `kind` on `target` is outstanding.
    pub fn is_pending(&self, kind: MutationKind, target: &MutationTarget) -> bool {
        self.pending.contains_key(&(kind, target.clone()))
    }

    /// Every outstanding mutation, oldest first.
    pub fn pending(&self) -> Vec<MutationRecord> {
        let mut records: Vec<MutationRecord> = self
            .pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.started_at);
        records
    }

    /// Create a post.
    ///
    /// On success the confirmed post is prepended to the cached global
    /// collection (if cached) and its owner's collection is invalidated.
    /// The single-post view is not populated.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: non-positive owner id (no remote call made),
    ///   or a malformed confirmed post (affected views are invalidated)
    /// - `Error::OperationInProgress`: the same draft is already being created
    /// - Any remote failure, unchanged
    pub async fn create(&self, draft: PostDraft) -> Result<Post> {
        CacheKeyBuilder::owner_collection(draft.owner_id)?;
        let _guard = self.begin(MutationKind::Create, MutationTarget::Draft(draft.clone()))?;

        debug!("» Create post for owner {}", draft.owner_id);
        let created = self
            .remote(MutationKind::Create, self.client.create_entity(draft))
            .await?;
        if let Err(e) = created.validate() {
            self.distrust(MutationKind::Create, None, &e);
            return Err(e);
        }

        let collection_key = CacheKeyBuilder::collection();
        let owner_key = CacheKeyBuilder::owner_collection(created.owner_id)?;

        let (written, invalidated) = self.store.batch(|tx| {
            let prepended = tx.patch_collection(&collection_key, |posts| {
                let mut out = Vec::with_capacity(posts.len() + 1);
                out.push(created.clone());
                out.extend(posts.into_iter().filter(|post| post.id != created.id));
                out
            });
            let invalidated = tx.invalidate(&owner_key);
            (usize::from(prepended), usize::from(invalidated))
        });

        self.finish(MutationKind::Create, created.id, written, invalidated);
        Ok(created)
    }

    /// Update a post.
    ///
    /// On success the confirmed post is written to its single-post view and
    /// replaced in every cached collection that should hold it. When the
    /// owner changed, any other owner's cached collection that still holds
    /// the post drops it and is invalidated wholesale.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: non-positive owner id (no remote call made),
    ///   or a malformed confirmed post (affected views are invalidated)
    /// - `Error::OperationInProgress`: an update of the same post is pending
    /// - `Error::NotFound`: the post does not exist remotely
    /// - Any other remote failure, unchanged
    pub async fn update(&self, post: Post) -> Result<Post> {
        CacheKeyBuilder::owner_collection(post.owner_id)?;
        let _guard = self.begin(MutationKind::Update, MutationTarget::Post(post.id))?;

        let id = post.id;
        debug!("» Update post {}", id);
        let updated = self
            .remote(MutationKind::Update, self.client.update_entity(post))
            .await?;
        if let Err(e) = updated.validate() {
            self.distrust(MutationKind::Update, Some(id), &e);
            return Err(e);
        }

        let entity_key = CacheKeyBuilder::entity(updated.cache_key());
        let collection_key = CacheKeyBuilder::collection();
        let owner_key = CacheKeyBuilder::owner_collection(updated.owner_id)?;

        let (written, invalidated) = self.store.batch(|tx| {
            let mut written = 1;
            tx.set(entity_key, CacheValue::Entity(updated.clone()));

            if tx.patch_collection(&collection_key, |posts| replace_post(posts, &updated)) {
                written += 1;
            }
            if tx.patch_collection(&owner_key, |posts| upsert_post(posts, &updated)) {
                written += 1;
            }

            let former_owners = tx.collection_keys_where(|key, posts| {
                key.is_owner_collection()
                    && *key != owner_key
                    && posts.iter().any(|post| post.id == updated.id)
            });
            for key in &former_owners {
                tx.patch_collection(key, |posts| remove_post(posts, updated.id));
                tx.invalidate(key);
            }

            (written, former_owners.len())
        });

        self.finish(MutationKind::Update, updated.id, written, invalidated);
        Ok(updated)
    }

    /// Delete a post whose owner is unknown.
    ///
    /// Equivalent to [`delete_owned`](Self::delete_owned) with no owner.
    pub async fn delete(&self, id: Identifier) -> Result<()> {
        self.delete_owned(id, None).await
    }

    /// Delete a post.
    ///
    /// On success the single-post view is evicted and the post is removed
    /// from every cached collection holding it. Unless `prior_owner` is
    /// given, every cached owner collection is also invalidated.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: non-positive `prior_owner` (no remote call made)
    /// - `Error::OperationInProgress`: a delete of the same post is pending
    /// - `Error::NotFound`: the post does not exist remotely
    /// - Any other remote failure, unchanged
    pub async fn delete_owned(&self, id: Identifier, prior_owner: Option<Identifier>) -> Result<()> {
        if let Some(owner_id) = prior_owner {
            CacheKeyBuilder::owner_collection(owner_id)?;
        }
        let _guard = self.begin(MutationKind::Delete, MutationTarget::Post(id))?;

        debug!("» Delete post {}", id);
        self.remote(MutationKind::Delete, self.client.delete_entity(id))
            .await?;

        let entity_key = CacheKeyBuilder::entity(id);
        let collection_key = CacheKeyBuilder::collection();

        let (written, invalidated) = self.store.batch(|tx| {
            let mut written = usize::from(tx.evict(&entity_key).is_some());

            let holders = tx.collection_keys_where(|key, posts| {
                *key == collection_key || posts.iter().any(|post| post.id == id)
            });
            for key in &holders {
                if tx.patch_collection(key, |posts| remove_post(posts, id)) {
                    written += 1;
                }
            }

            // Owner unknown: every owner view is suspect.
            let invalidated = match prior_owner {
                Some(_) => 0,
                None => invalidate_owner_collections(tx),
            };

            (written, invalidated)
        });

        self.finish(MutationKind::Delete, id, written, invalidated);
        Ok(())
    }

    /// Claim the pending slot for `(kind, target)`.
    fn begin(&self, kind: MutationKind, target: MutationTarget) -> Result<PendingGuard> {
        let slot = (kind, target);
        match self.pending.entry(slot.clone()) {
            Entry::Occupied(_) => {
                warn!("✗ Rejected {} of {}: already in progress", kind, slot.1);
                Err(Error::OperationInProgress(format!("{} {}", kind, slot.1)))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MutationRecord {
                    kind,
                    target: slot.1.clone(),
                    started_at: Instant::now(),
                });
                Ok(PendingGuard {
                    pending: Arc::clone(&self.pending),
                    slot,
                })
            }
        }
    }

    async fn remote<T>(
        &self,
        kind: MutationKind,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        call.await.map_err(|e| {
            warn!("✗ Remote {} failed, cache untouched: {}", kind, e);
            e
        })
    }

    /// The remote write went through but its result cannot be applied:
    /// mark every view it may have changed stale.
    fn distrust(&self, kind: MutationKind, id: Option<Identifier>, error: &Error) {
        let invalidated = self.store.batch(|tx| {
            let mut invalidated = tx.invalidate_where(CacheKey::is_post_collection).len();
            if let Some(id) = id {
                invalidated += usize::from(tx.invalidate(&CacheKeyBuilder::entity(id)));
            }
            invalidated
        });
        self.metrics.record_cascade(kind, 0, invalidated);
        warn!(
            "✗ Remote {} returned an unusable post, {} views invalidated: {}",
            kind, invalidated, error
        );
    }

    fn finish(&self, kind: MutationKind, id: Identifier, written: usize, invalidated: usize) {
        self.metrics.record_cascade(kind, written, invalidated);
        info!(
            "✓ {} post {} reconciled ({} views written, {} invalidated)",
            kind, id, written, invalidated
        );
    }
}

fn invalidate_owner_collections(tx: &mut StoreBatch<'_>) -> usize {
    tx.invalidate_where(CacheKey::is_owner_collection).len()
}

fn replace_post(posts: Vec<Post>, updated: &Post) -> Vec<Post> {
    posts
        .into_iter()
        .map(|post| {
            if post.id == updated.id {
                updated.clone()
            } else {
                post
            }
        })
        .collect()
}

/// Replace in place, or insert at the first position with a larger id.
fn upsert_post(mut posts: Vec<Post>, updated: &Post) -> Vec<Post> {
    match posts.iter_mut().find(|post| post.id == updated.id) {
        Some(existing) => *existing = updated.clone(),
        None => {
            let at = posts
                .iter()
                .position(|post| post.id > updated.id)
                .unwrap_or(posts.len());
            posts.insert(at, updated.clone());
        }
    }
    posts
}

fn remove_post(posts: Vec<Post>, id: Identifier) -> Vec<Post> {
    posts.into_iter().filter(|post| post.id != id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryRemote, RemoteCall};
    use std::time::Duration;

    fn post(id: Identifier, owner_id: Identifier, title: &str) -> Post {
        Post {
            id,
            owner_id,
            title: title.to_string(),
            body: title.to_lowercase(),
        }
    }

    fn setup(posts: Vec<Post>) -> (InMemoryRemote, MutationExecutor<InMemoryRemote>) {
        let remote = InMemoryRemote::new().with_posts(posts);
        let executor = MutationExecutor::new(CacheStore::new(), Arc::new(remote.clone()));
        (remote, executor)
    }

    fn collection(store: &CacheStore, key: &CacheKey) -> Vec<Post> {
        store.get(key).expect("not cached").value.into_posts().unwrap()
    }

    #[tokio::test]
    async fn test_create_prepends_and_invalidates_owner() {
        let (_remote, executor) = setup(vec![post(1, 1, "A")]);
        let store = executor.store().clone();
        let owner_key = CacheKeyBuilder::owner_collection(1).unwrap();
        store.set(CacheKeyBuilder::collection(), CacheValue::Collection(vec![post(1, 1, "A")]));
        store.set(owner_key.clone(), CacheValue::Collection(vec![post(1, 1, "A")]));

        let created = executor.create(PostDraft::new(1, "B", "b")).await.unwrap();

        assert_eq!(created, post(2, 1, "B"));
        assert_eq!(
            collection(&store, &CacheKeyBuilder::collection()),
            vec![post(2, 1, "B"), post(1, 1, "A")]
        );
        assert!(store.get(&owner_key).unwrap().is_invalidated());
        assert!(!store.contains(&CacheKeyBuilder::entity(2)));
    }

    #[tokio::test]
    async fn test_create_never_synthesizes_collection() {
        let (_remote, executor) = setup(vec![]);

        executor.create(PostDraft::new(1, "B", "b")).await.unwrap();

        assert!(executor.store().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_owner_without_remote_call() {
        let (remote, executor) = setup(vec![]);

        let err = executor.create(PostDraft::new(0, "B", "b")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_writes_through_every_view() {
        let (_remote, executor) = setup(vec![post(1, 1, "A"), post(2, 1, "B")]);
        let store = executor.store().clone();
        let owner_key = CacheKeyBuilder::owner_collection(1).unwrap();
        store.set(
            CacheKeyBuilder::collection(),
            CacheValue::Collection(vec![post(1, 1, "A"), post(2, 1, "B")]),
        );
        store.set(
            owner_key.clone(),
            CacheValue::Collection(vec![post(1, 1, "A"), post(2, 1, "B")]),
        );

        let updated = executor.update(post(1, 1, "A2")).await.unwrap();

        assert_eq!(updated, post(1, 1, "A2"));
        assert_eq!(
            store.get(&CacheKeyBuilder::entity(1)).unwrap().value,
            CacheValue::Entity(post(1, 1, "A2"))
        );
        assert_eq!(
            collection(&store, &CacheKeyBuilder::collection()),
            vec![post(1, 1, "A2"), post(2, 1, "B")]
        );
        assert_eq!(
            collection(&store, &owner_key),
            vec![post(1, 1, "A2"), post(2, 1, "B")]
        );
        assert!(store.get(&owner_key).unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_update_owner_change_moves_post() {
        let (_remote, executor) = setup(vec![post(1, 1, "A"), post(3, 2, "C")]);
        let store = executor.store().clone();
        let old_owner = CacheKeyBuilder::owner_collection(1).unwrap();
        let new_owner = CacheKeyBuilder::owner_collection(2).unwrap();
        store.set(old_owner.clone(), CacheValue::Collection(vec![post(1, 1, "A")]));
        store.set(new_owner.clone(), CacheValue::Collection(vec![post(3, 2, "C")]));

        executor.update(post(1, 2, "A2")).await.unwrap();

        let old_entry = store.get(&old_owner).unwrap();
        assert!(old_entry.is_invalidated());
        assert_eq!(old_entry.value, CacheValue::Collection(vec![]));
        assert_eq!(
            collection(&store, &new_owner),
            vec![post(1, 2, "A2"), post(3, 2, "C")]
        );

        let copies = store.entity_copies(1);
        assert!(copies.iter().all(|(_, copy)| *copy == post(1, 2, "A2")));
    }

    #[tokio::test]
    async fn test_update_failure_leaves_store_untouched() {
        let (remote, executor) = setup(vec![post(1, 1, "A")]);
        let store = executor.store().clone();
        store.set(CacheKeyBuilder::collection(), CacheValue::Collection(vec![post(1, 1, "A")]));
        store.set(
            CacheKeyBuilder::owner_collection(1).unwrap(),
            CacheValue::Collection(vec![post(1, 1, "A")]),
        );
        let before = store.snapshot().unwrap();

        remote.fail_next(Error::http(503, "unavailable"));
        let err = executor.update(post(1, 2, "A2")).await.unwrap_err();

        assert_eq!(err, Error::http(503, "unavailable"));
        assert_eq!(store.snapshot().unwrap(), before);
        assert!(executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_post_is_not_found() {
        let (_remote, executor) = setup(vec![]);

        let err = executor.update(post(42, 1, "X")).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(executor.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_update_same_post_rejected() {
        let remote = InMemoryRemote::new()
            .with_posts(vec![post(1, 1, "A")])
            .with_latency(Duration::from_millis(100));
        let executor = MutationExecutor::new(CacheStore::new(), Arc::new(remote.clone()));

        let (first, second) = tokio::join!(
            executor.update(post(1, 1, "A2")),
            executor.update(post(1, 1, "A3")),
        );

        assert_eq!(first.unwrap(), post(1, 1, "A2"));
        assert!(matches!(second, Err(Error::OperationInProgress(_))));
        assert_eq!(remote.calls(RemoteCall::Update), 1);

        // Slot is released once the first update settles.
        executor.update(post(1, 1, "A4")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_updates_of_different_posts_proceed() {
        let remote = InMemoryRemote::new()
            .with_posts(vec![post(1, 1, "A"), post(2, 1, "B")])
            .with_latency(Duration::from_millis(100));
        let executor = MutationExecutor::new(CacheStore::new(), Arc::new(remote.clone()));

        let (a, b) = tokio::join!(
            executor.update(post(1, 1, "A2")),
            executor.update(post(2, 1, "B2")),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(remote.calls(RemoteCall::Update), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_records_visible_while_in_flight() {
        let remote = InMemoryRemote::new()
            .with_posts(vec![post(1, 1, "A")])
            .with_latency(Duration::from_millis(100));
        let executor = MutationExecutor::new(CacheStore::new(), Arc::new(remote));
        let target = MutationTarget::Post(1);

        let observer = executor.clone();
        let (result, seen) = tokio::join!(executor.delete(1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            (
                observer.is_pending(MutationKind::Delete, &MutationTarget::Post(1)),
                observer.pending(),
            )
        });

        result.unwrap();
        assert!(seen.0);
        assert_eq!(seen.1.len(), 1);
        assert_eq!(seen.1[0].kind, MutationKind::Delete);
        assert!(!executor.is_pending(MutationKind::Delete, &target));
    }

    #[tokio::test]
    async fn test_delete_with_known_owner_patches_only_that_owner() {
        let (_remote, executor) = setup(vec![post(1, 1, "A"), post(2, 1, "B"), post(3, 2, "C")]);
        let store = executor.store().clone();
        let owner_one = CacheKeyBuilder::owner_collection(1).unwrap();
        let owner_two = CacheKeyBuilder::owner_collection(2).unwrap();
        store.set(CacheKeyBuilder::entity(1), CacheValue::Entity(post(1, 1, "A")));
        store.set(
            CacheKeyBuilder::collection(),
            CacheValue::Collection(vec![post(1, 1, "A"), post(2, 1, "B"), post(3, 2, "C")]),
        );
        store.set(
            owner_one.clone(),
            CacheValue::Collection(vec![post(1, 1, "A"), post(2, 1, "B")]),
        );
        store.set(owner_two.clone(), CacheValue::Collection(vec![post(3, 2, "C")]));

        executor.delete_owned(1, Some(1)).await.unwrap();

        assert!(!store.contains(&CacheKeyBuilder::entity(1)));
        assert_eq!(
            collection(&store, &CacheKeyBuilder::collection()),
            vec![post(2, 1, "B"), post(3, 2, "C")]
        );
        assert_eq!(collection(&store, &owner_one), vec![post(2, 1, "B")]);
        assert!(store.get(&owner_one).unwrap().is_fresh());
        assert!(store.get(&owner_two).unwrap().is_fresh());
        assert!(store.entity_copies(1).is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_owner_invalidates_every_owner_view() {
        let (_remote, executor) = setup(vec![post(1, 1, "A"), post(3, 2, "C")]);
        let store = executor.store().clone();
        let owner_one = CacheKeyBuilder::owner_collection(1).unwrap();
        let owner_two = CacheKeyBuilder::owner_collection(2).unwrap();
        store.set(owner_one.clone(), CacheValue::Collection(vec![post(1, 1, "A")]));
        store.set(owner_two.clone(), CacheValue::Collection(vec![post(3, 2, "C")]));

        executor.delete(1).await.unwrap();

        assert!(store.get(&owner_one).unwrap().is_invalidated());
        assert!(store.get(&owner_two).unwrap().is_invalidated());
        assert_eq!(collection(&store, &owner_one), vec![]);
        assert!(store.entity_copies(1).is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_leaves_store_untouched() {
        let (_remote, executor) = setup(vec![post(1, 1, "A")]);
        let store = executor.store().clone();
        store.set(CacheKeyBuilder::entity(7), CacheValue::Entity(post(7, 1, "G")));
        let before = store.snapshot().unwrap();

        let err = executor.delete(7).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    /// Remote that confirms writes but returns posts without an owner.
    struct OwnerlessRemote(InMemoryRemote);

    impl RemoteServiceClient for OwnerlessRemote {
        async fn fetch_collection(&self) -> Result<Vec<Post>> {
            self.0.fetch_collection().await
        }
        async fn fetch_entity(&self, id: Identifier) -> Result<Post> {
            self.0.fetch_entity(id).await
        }
        async fn create_entity(&self, draft: PostDraft) -> Result<Post> {
            let created = self.0.create_entity(draft).await?;
            Ok(Post { owner_id: 0, ..created })
        }
        async fn update_entity(&self, post: Post) -> Result<Post> {
            let updated = self.0.update_entity(post).await?;
            Ok(Post { owner_id: 0, ..updated })
        }
        async fn delete_entity(&self, id: Identifier) -> Result<()> {
            self.0.delete_entity(id).await
        }
        async fn fetch_users(&self) -> Result<Vec<crate::entity::User>> {
            self.0.fetch_users().await
        }
    }

    fn ownerless_setup() -> (InMemoryRemote, MutationExecutor<OwnerlessRemote>) {
        let remote = InMemoryRemote::new().with_posts(vec![post(1, 1, "A")]);
        let executor = MutationExecutor::new(
            CacheStore::new(),
            Arc::new(OwnerlessRemote(remote.clone())),
        );
        let store = executor.store();
        store.set(CacheKeyBuilder::collection(), CacheValue::Collection(vec![post(1, 1, "A")]));
        store.set(
            CacheKeyBuilder::owner_collection(1).unwrap(),
            CacheValue::Collection(vec![post(1, 1, "A")]),
        );
        store.set(CacheKeyBuilder::entity(1), CacheValue::Entity(post(1, 1, "A")));
        (remote, executor)
    }

    #[tokio::test]
    async fn test_unusable_update_result_invalidates_views() {
        let (remote, executor) = ownerless_setup();
        let store = executor.store().clone();

        let err = executor.update(post(1, 1, "A2")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(remote.posts()[0].title, "A2");
        for key in [
            CacheKeyBuilder::collection(),
            CacheKeyBuilder::owner_collection(1).unwrap(),
            CacheKeyBuilder::entity(1),
        ] {
            assert!(store.get(&key).unwrap().is_invalidated(), "{} still fresh", key);
        }
        assert!(executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_create_result_invalidates_collections() {
        let (remote, executor) = ownerless_setup();
        let store = executor.store().clone();

        let err = executor.create(PostDraft::new(1, "B", "b")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(remote.posts().len(), 2);
        assert!(store.get(&CacheKeyBuilder::collection()).unwrap().is_invalidated());
        assert!(store
            .get(&CacheKeyBuilder::owner_collection(1).unwrap())
            .unwrap()
            .is_invalidated());
        assert!(store.get(&CacheKeyBuilder::entity(1)).unwrap().is_fresh());
    }

    #[test]
    fn test_upsert_inserts_in_id_order() {
        let posts = vec![post(1, 2, "A"), post(5, 2, "E")];
        assert_eq!(
            upsert_post(posts.clone(), &post(3, 2, "C")),
            vec![post(1, 2, "A"), post(3, 2, "C"), post(5, 2, "E")]
        );
        assert_eq!(
            upsert_post(posts.clone(), &post(9, 2, "I")),
            vec![post(1, 2, "A"), post(5, 2, "E"), post(9, 2, "I")]
        );
        assert_eq!(
            upsert_post(posts, &post(5, 2, "E2")),
            vec![post(1, 2, "A"), post(5, 2, "E2")]
        );
    }
}

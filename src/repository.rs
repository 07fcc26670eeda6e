//! Remote service contract and an in-memory implementation.

use crate::entity::{Identifier, Post, PostDraft, User};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Operations the cache engine needs from the remote service.
///
/// Any call may fail with `Error::Transport` in addition to the domain errors
/// listed per method. Transport details (paths, headers, latency) are the
/// implementation's business.
///
/// # Example
///
/// ```ignore
/// struct HttpPosts { client: reqwest::Client }
///
/// impl RemoteServiceClient for HttpPosts {
///     async fn fetch_collection(&self) -> Result<Vec<Post>> {
///         // GET /posts
///     }
///     // ...
/// }
/// ```
pub trait RemoteServiceClient: Send + Sync + 'static {
    /// The whole post collection.
    fn fetch_collection(&self) -> impl Future<Output = Result<Vec<Post>>> + Send;

    /// Posts owned by `owner_id`, in the service's order.
    ///
    /// Defaults to filtering [`fetch_collection`](Self::fetch_collection).
    fn fetch_owner_collection(
        &self,
        owner_id: Identifier,
    ) -> impl Future<Output = Result<Vec<Post>>> + Send {
        async move {
            let posts = self.fetch_collection().await?;
            Ok(posts
                .into_iter()
                .filter(|post| post.owner_id == owner_id)
                .collect())
        }
    }

    /// A single post. Fails with `Error::NotFound` when absent.
    fn fetch_entity(&self, id: Identifier) -> impl Future<Output = Result<Post>> + Send;

    /// Create a post; the service assigns its id.
    fn create_entity(&self, draft: PostDraft) -> impl Future<Output = Result<Post>> + Send;

    /// Replace a post. Fails with `Error::NotFound` when the id is unknown.
    fn update_entity(&self, post: Post) -> impl Future<Output = Result<Post>> + Send;

    /// Delete a post. Fails with `Error::NotFound` when the id is unknown.
    fn delete_entity(&self, id: Identifier) -> impl Future<Output = Result<()>> + Send;

    /// Every user.
    fn fetch_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;
}

/// Call kinds counted by [`InMemoryRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    FetchCollection,
    FetchOwnerCollection,
    FetchEntity,
    Create,
    Update,
    Delete,
    FetchUsers,
}

/// In-memory remote service for tests and demos.
///
/// Supports simulated latency, one-shot failure injection and per-call
/// counters. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    inner: Arc<RemoteState>,
}

#[derive(Default)]
struct RemoteState {
    posts: Mutex<Vec<Post>>,
    users: Mutex<Vec<User>>,
    latency: Mutex<Duration>,
    failures: Mutex<VecDeque<Error>>,
    calls: DashMap<RemoteCall, usize>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with posts, kept in ascending id order.
    pub fn with_posts(self, posts: Vec<Post>) -> Self {
        {
            let mut stored = lock(&self.inner.posts);
            *stored = posts;
            stored.sort_by_key(|post| post.id);
        }
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        *lock(&self.inner.users) = users;
        self
    }

    /// Delay applied to every call before it completes.
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.inner.latency) = latency;
        self
    }

    /// Seed from JSON arrays shaped like the public posts/users API.
    pub fn from_json(posts_json: &str, users_json: &str) -> Result<Self> {
        let posts: Vec<Post> = serde_json::from_str(posts_json)?;
        let users: Vec<User> = serde_json::from_str(users_json)?;
        Ok(Self::new().with_posts(posts).with_users(users))
    }

    /// Make the next call (of any kind) fail with `error`.
    pub fn fail_next(&self, error: Error) {
        lock(&self.inner.failures).push_back(error);
    }

    /// Number of calls of one kind so far.
    pub fn calls(&self, call: RemoteCall) -> usize {
        self.inner.calls.get(&call).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.inner.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Current remote posts.
    pub fn posts(&self) -> Vec<Post> {
        lock(&self.inner.posts).clone()
    }

    /// Change remote state without going through the engine, as another
    /// writer would.
    pub fn put_post(&self, post: Post) {
        let mut posts = lock(&self.inner.posts);
        match posts.iter_mut().find(|existing| existing.id == post.id) {
            Some(existing) => *existing = post,
            None => {
                posts.push(post);
                posts.sort_by_key(|post| post.id);
            }
        }
    }

    async fn begin(&self, call: RemoteCall) -> Result<()> {
        *self.inner.calls.entry(call).or_insert(0) += 1;

        let latency = *lock(&self.inner.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match lock(&self.inner.failures).pop_front() {
            Some(error) => {
                warn!("✗ Remote {:?} failed: {}", call, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl RemoteServiceClient for InMemoryRemote {
    async fn fetch_collection(&self) -> Result<Vec<Post>> {
        self.begin(RemoteCall::FetchCollection).await?;
        Ok(self.posts())
    }

    async fn fetch_owner_collection(&self, owner_id: Identifier) -> Result<Vec<Post>> {
        self.begin(RemoteCall::FetchOwnerCollection).await?;
        Ok(self
            .posts()
            .into_iter()
            .filter(|post| post.owner_id == owner_id)
            .collect())
    }

    async fn fetch_entity(&self, id: Identifier) -> Result<Post> {
        self.begin(RemoteCall::FetchEntity).await?;
        lock(&self.inner.posts)
            .iter()
            .find(|post| post.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("post {}", id)))
    }

    async fn create_entity(&self, draft: PostDraft) -> Result<Post> {
        self.begin(RemoteCall::Create).await?;
        let mut posts = lock(&self.inner.posts);
        let id = posts.iter().map(|post| post.id).max().unwrap_or(0) + 1;
        let created = Post::from_draft(id, draft);
        posts.push(created.clone());
        Ok(created)
    }

    async fn update_entity(&self, post: Post) -> Result<Post> {
        self.begin(RemoteCall::Update).await?;
        let mut posts = lock(&self.inner.posts);
        let existing = posts
            .iter_mut()
            .find(|existing| existing.id == post.id)
            .ok_or_else(|| Error::NotFound(format!("post {}", post.id)))?;
        *existing = post.clone();
        Ok(post)
    }

    async fn delete_entity(&self, id: Identifier) -> Result<()> {
        self.begin(RemoteCall::Delete).await?;
        let mut posts = lock(&self.inner.posts);
        let before = posts.len();
        posts.retain(|post| post.id != id);
        if posts.len() == before {
            return Err(Error::NotFound(format!("post {}", id)));
        }
        Ok(())
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        self.begin(RemoteCall::FetchUsers).await?;
        Ok(lock(&self.inner.users).clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! # cache-sync
//!
//! Client-side cache synchronization for a mutable resource collection
//! (posts owned by users) served by a slow, unreliable remote service.
//!
//! ## Features
//!
//! - **Denormalized views:** global collection, per-owner collections and
//!   single-post views, all kept consistent across mutations
//! - **Freshness windows:** per-view staleness with explicit invalidation
//! - **Request de-duplication:** concurrent reads of one key share one fetch
//! - **Write-through cascades:** confirmed mutations update or invalidate
//!   every affected view in one atomic step
//! - **Single-flight mutations:** a second mutation of the same target is
//!   rejected while the first is pending
//! - **Failure isolation:** a failed remote call leaves the cache untouched
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_sync::{CacheService, InMemoryRemote, PostDraft, SyncConfig};
//!
//! let remote = InMemoryRemote::new();
//! let service = CacheService::with_config(remote, SyncConfig::from_env());
//!
//! // Reads go through the cache
//! let posts = service.posts().await?;
//!
//! // Mutations reconcile every cached view on success
//! let created = service.create_post(PostDraft::new(1, "Title", "Body text")).await?;
//! let mine = service.posts_by_owner(1).await?;
//! ```

#[macro_use]
extern crate log;

pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod mutation;
pub mod observability;
pub mod query;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use builder::ReadOperationBuilder;
pub use config::{FreshnessPolicy, SyncConfig};
pub use entity::{CacheEntity, Identifier, Post, PostDraft, User};
pub use error::{Error, ErrorKind, Result};
pub use key::{CacheKey, CacheKeyBuilder};
pub use mutation::{MutationExecutor, MutationKind, MutationRecord, MutationTarget};
pub use observability::{CacheMetrics, NoOpMetrics};
pub use query::QueryExecutor;
pub use repository::{InMemoryRemote, RemoteCall, RemoteServiceClient};
pub use service::CacheService;
pub use store::{CacheEntry, CacheStore, CacheValue};
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

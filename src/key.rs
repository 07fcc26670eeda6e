//! Canonical cache keys for every cached view.
//!
//! All components derive keys through [`CacheKeyBuilder`] so the global,
//! per-owner and single-entity views agree on key shape.

use crate::entity::{CacheEntity, Identifier, Post};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one cached view.
///
/// Keys compare structurally: two keys are equal iff every element of
/// their [`segments`](CacheKey::segments) tuple is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKey {
    /// Every post.
    Collection,
    /// Posts owned by one user.
    OwnerCollection(Identifier),
    /// A single post.
    Entity(Identifier),
    /// Every user.
    Users,
}

/// One element of a key tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(&'static str),
    Id(Identifier),
}

const COLLECTION: &str = "posts";
const OWNER: &str = "user";

impl CacheKey {
    /// The ordered tuple this key stands for.
    pub fn segments(&self) -> Vec<KeySegment> {
        match self {
            CacheKey::Collection => vec![KeySegment::Name(COLLECTION)],
            CacheKey::OwnerCollection(owner) => vec![
                KeySegment::Name(COLLECTION),
                KeySegment::Name(OWNER),
                KeySegment::Id(*owner),
            ],
            CacheKey::Entity(id) => vec![KeySegment::Name(Post::cache_prefix()), KeySegment::Id(*id)],
            CacheKey::Users => vec![KeySegment::Name("users")],
        }
    }

    /// Whether the cached value under this key is a list of posts.
    pub fn is_post_collection(&self) -> bool {
        matches!(self, CacheKey::Collection | CacheKey::OwnerCollection(_))
    }

    pub fn is_owner_collection(&self) -> bool {
        matches!(self, CacheKey::OwnerCollection(_))
    }

    /// Owner id for per-owner keys.
    pub fn owner(&self) -> Option<Identifier> {
        match self {
            CacheKey::OwnerCollection(owner) => Some(*owner),
            _ => None,
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Name(name) => f.write_str(name),
            KeySegment::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Renders as `segment:segment:...`, e.g. `posts:user:3` or `post:12`.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in self.segments() {
            if !first {
                f.write_str(":")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

/// Pure, deterministic key builders.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key of the global post collection.
    pub fn collection() -> CacheKey {
        CacheKey::Collection
    }

    /// Key of one owner's post collection.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` when `owner_id` is not a positive integer.
    pub fn owner_collection(owner_id: Identifier) -> Result<CacheKey> {
        if owner_id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "owner id must be a positive integer, got {}",
                owner_id
            )));
        }
        Ok(CacheKey::OwnerCollection(owner_id))
    }

    /// Key of a single post.
    pub fn entity(id: Identifier) -> CacheKey {
        CacheKey::Entity(id)
    }

    /// Key of the user collection.
    pub fn users() -> CacheKey {
        CacheKey::Users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shapes() {
        assert_eq!(CacheKeyBuilder::collection().to_string(), "posts");
        assert_eq!(
            CacheKeyBuilder::owner_collection(3).unwrap().to_string(),
            "posts:user:3"
        );
        assert_eq!(CacheKeyBuilder::entity(12).to_string(), "post:12");
        assert_eq!(CacheKeyBuilder::users().to_string(), "users");
    }

    #[test]
    fn test_owner_collection_rejects_non_positive() {
        assert!(matches!(
            CacheKeyBuilder::owner_collection(0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            CacheKeyBuilder::owner_collection(-7),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_segments() {
        assert_eq!(
            CacheKeyBuilder::owner_collection(2).unwrap().segments(),
            vec![
                KeySegment::Name("posts"),
                KeySegment::Name("user"),
                KeySegment::Id(2)
            ]
        );
        assert_eq!(
            CacheKeyBuilder::entity(2).segments(),
            vec![KeySegment::Name("post"), KeySegment::Id(2)]
        );
    }

    #[test]
    fn test_entity_and_owner_keys_never_collide() {
        assert_ne!(
            CacheKeyBuilder::entity(1),
            CacheKeyBuilder::owner_collection(1).unwrap()
        );
        assert!(CacheKeyBuilder::owner_collection(1)
            .unwrap()
            .is_post_collection());
        assert!(!CacheKeyBuilder::entity(1).is_post_collection());
        assert_eq!(CacheKeyBuilder::owner_collection(4).unwrap().owner(), Some(4));
    }
}

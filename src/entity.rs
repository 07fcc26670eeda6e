//! Cached entity types and the trait they share.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;

/// Remote-assigned identifier for posts and users.
pub type Identifier = i64;

/// Trait implemented by every entity the engine caches.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use cache_sync::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Comment {
///     pub id: i64,
///     pub body: String,
/// }
///
/// impl CacheEntity for Comment {
///     type Key = i64;
///
///     fn cache_key(&self) -> Self::Key {
///         self.id
///     }
///
///     fn cache_prefix() -> &'static str {
///         "comment"
///     }
/// }
/// ```
pub trait CacheEntity: Send + Sync + Serialize + for<'de> Deserialize<'de> + Clone {
    /// Type of the entity's identifier.
    type Key: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Return the entity's identifier.
    fn cache_key(&self) -> Self::Key;

    /// Namespace used when rendering keys, e.g. `"post"`.
    fn cache_prefix() -> &'static str;

    /// Optional: structural checks on a value received from the remote service.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// A post owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Post {
    pub id: Identifier,
    #[serde(rename = "userId")]
    pub owner_id: Identifier,
    pub title: String,
    pub body: String,
}

/// A post before the remote service has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostDraft {
    #[serde(rename = "userId")]
    pub owner_id: Identifier,
    pub title: String,
    pub body: String,
}

/// A user that owns posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Identifier,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl Post {
    /// Attach a server-assigned id to a draft.
    pub fn from_draft(id: Identifier, draft: PostDraft) -> Self {
        Post {
            id,
            owner_id: draft.owner_id,
            title: draft.title,
            body: draft.body,
        }
    }

    /// Editable fields of this post.
    pub fn draft(&self) -> PostDraft {
        PostDraft {
            owner_id: self.owner_id,
            title: self.title.clone(),
            body: self.body.clone(),
        }
    }

    /// Apply the form rules to this post's editable fields.
    pub fn validate_form(&self) -> Result<()> {
        self.draft().validate_form()
    }
}

impl PostDraft {
    pub fn new(owner_id: Identifier, title: impl Into<String>, body: impl Into<String>) -> Self {
        PostDraft {
            owner_id,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Check the draft against the post form rules.
    ///
    /// Every failed rule is reported, not just the first one.
    pub fn validate_form(&self) -> Result<()> {
        let mut errors = Vec::new();

        let title = self.title.trim().chars().count();
        if title == 0 {
            errors.push("Title is required".to_string());
        } else if title < 3 {
            errors.push("Title must be at least 3 characters long".to_string());
        } else if title > 100 {
            errors.push("Title must be less than 100 characters".to_string());
        }

        let body = self.body.trim().chars().count();
        if body == 0 {
            errors.push("Content is required".to_string());
        } else if body < 10 {
            errors.push("Content must be at least 10 characters long".to_string());
        } else if body > 1000 {
            errors.push("Content must be less than 1000 characters".to_string());
        }

        if self.owner_id <= 0 {
            errors.push("Valid user ID is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ValidationError(errors))
        }
    }
}

impl CacheEntity for Post {
    type Key = Identifier;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn cache_prefix() -> &'static str {
        "post"
    }

    fn validate(&self) -> Result<()> {
        if self.id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "post id must be positive, got {}",
                self.id
            )));
        }
        if self.owner_id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "post {} has non-positive owner id {}",
                self.id, self.owner_id
            )));
        }
        Ok(())
    }
}

impl CacheEntity for User {
    type Key = Identifier;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn cache_prefix() -> &'static str {
        "user"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: Identifier, owner_id: Identifier) -> Post {
        Post {
            id,
            owner_id,
            title: "Title".to_string(),
            body: "Body text".to_string(),
        }
    }

    #[test]
    fn test_cache_key_generation() {
        let entity = post(123, 1);

        assert_eq!(entity.cache_key(), 123);
        assert_eq!(Post::cache_prefix(), "post");
        assert_eq!(User::cache_prefix(), "user");
    }

    #[test]
    fn test_post_json_uses_user_id_field() {
        let parsed: Post =
            serde_json::from_str(r#"{"id":1,"userId":4,"title":"t","body":"b"}"#).unwrap();
        assert_eq!(parsed.owner_id, 4);

        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["userId"], 4);
    }

    #[test]
    fn test_validate_rejects_non_positive_ids() {
        assert!(post(1, 1).validate().is_ok());
        assert!(matches!(
            post(0, 1).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            post(1, -3).validate(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_form_collects_every_rule() {
        let draft = PostDraft::new(0, "  ", "short");
        match draft.validate_form() {
            Err(Error::ValidationError(errors)) => {
                assert_eq!(
                    errors,
                    vec![
                        "Title is required".to_string(),
                        "Content must be at least 10 characters long".to_string(),
                        "Valid user ID is required".to_string(),
                    ]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_form_bounds() {
        assert!(PostDraft::new(1, "abc", "0123456789").validate_form().is_ok());
        assert!(PostDraft::new(1, "ab", "0123456789").validate_form().is_err());
        assert!(PostDraft::new(1, "a".repeat(101), "0123456789")
            .validate_form()
            .is_err());
        assert!(PostDraft::new(1, "abc", "x".repeat(1001))
            .validate_form()
            .is_err());
    }

    #[test]
    fn test_draft_round_trip_through_post() {
        let draft = PostDraft::new(2, "Hello", "World body");
        let created = Post::from_draft(10, draft.clone());
        assert_eq!(created.id, 10);
        assert_eq!(created.draft(), draft);
    }
}

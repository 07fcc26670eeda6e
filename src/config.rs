//! Engine configuration.

use crate::key::CacheKey;
use crate::strategy::CacheStrategy;
use std::time::Duration;

/// Default freshness of the global and per-owner post collections.
pub const DEFAULT_COLLECTION_FRESHNESS: Duration = Duration::from_secs(60);

/// Default freshness of the user collection.
pub const DEFAULT_USERS_FRESHNESS: Duration = Duration::from_secs(5 * 60);

pub const ENV_COLLECTION_FRESHNESS: &str = "CACHE_SYNC_COLLECTION_FRESHNESS_SECS";
pub const ENV_OWNER_FRESHNESS: &str = "CACHE_SYNC_OWNER_FRESHNESS_SECS";
pub const ENV_ENTITY_FRESHNESS: &str = "CACHE_SYNC_ENTITY_FRESHNESS_SECS";
pub const ENV_USERS_FRESHNESS: &str = "CACHE_SYNC_USERS_FRESHNESS_SECS";
pub const ENV_STRATEGY: &str = "CACHE_SYNC_STRATEGY";

/// Per-view freshness windows.
///
/// `None` means the view stays fresh until it is explicitly invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub collection: Option<Duration>,
    pub owner_collection: Option<Duration>,
    pub entity: Option<Duration>,
    pub users: Option<Duration>,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        FreshnessPolicy {
            collection: Some(DEFAULT_COLLECTION_FRESHNESS),
            owner_collection: Some(DEFAULT_COLLECTION_FRESHNESS),
            entity: None,
            users: Some(DEFAULT_USERS_FRESHNESS),
        }
    }
}

impl FreshnessPolicy {
    /// Same window for every view.
    pub fn fixed(window: Duration) -> Self {
        FreshnessPolicy {
            collection: Some(window),
            owner_collection: Some(window),
            entity: Some(window),
            users: Some(window),
        }
    }

    /// Views never age out; only invalidation makes them stale.
    pub fn until_invalidated() -> Self {
        FreshnessPolicy {
            collection: None,
            owner_collection: None,
            entity: None,
            users: None,
        }
    }

    pub fn window_for(&self, key: &CacheKey) -> Option<Duration> {
        match key {
            CacheKey::Collection => self.collection,
            CacheKey::OwnerCollection(_) => self.owner_collection,
            CacheKey::Entity(_) => self.entity,
            CacheKey::Users => self.users,
        }
    }
}

/// Top-level configuration for [`CacheService`](crate::CacheService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncConfig {
    pub freshness: FreshnessPolicy,
    pub strategy: CacheStrategy,
}

impl SyncConfig {
    /// Build from the process environment.
    ///
    /// Unset variables keep their defaults. Unparsable values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SyncConfig::default();

        apply_window(&lookup, ENV_COLLECTION_FRESHNESS, &mut config.freshness.collection);
        apply_window(&lookup, ENV_OWNER_FRESHNESS, &mut config.freshness.owner_collection);
        apply_window(&lookup, ENV_ENTITY_FRESHNESS, &mut config.freshness.entity);
        apply_window(&lookup, ENV_USERS_FRESHNESS, &mut config.freshness.users);

        if let Some(raw) = lookup(ENV_STRATEGY) {
            match raw.parse::<CacheStrategy>() {
                Ok(strategy) => config.strategy = strategy,
                Err(e) => warn!("⚠ Ignoring {}={:?}: {}", ENV_STRATEGY, raw, e),
            }
        }

        config
    }

    pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// `0` or `none` disables the window; any other value is whole seconds.
fn apply_window<F>(lookup: &F, name: &str, slot: &mut Option<Duration>)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return;
    };

    let value = raw.trim();
    if value.eq_ignore_ascii_case("none") {
        *slot = None;
        return;
    }

    match value.parse::<u64>() {
        Ok(0) => *slot = None,
        Ok(secs) => *slot = Some(Duration::from_secs(secs)),
        Err(_) => warn!("⚠ Ignoring {}={:?}: not a number of seconds", name, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_windows() {
        let policy = FreshnessPolicy::default();
        assert_eq!(
            policy.window_for(&CacheKey::Collection),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            policy.window_for(&CacheKey::OwnerCollection(1)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(policy.window_for(&CacheKey::Entity(1)), None);
        assert_eq!(
            policy.window_for(&CacheKey::Users),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_fixed_policy() {
        let policy = FreshnessPolicy::fixed(Duration::from_secs(5));
        assert_eq!(
            policy.window_for(&CacheKey::Entity(9)),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            (ENV_COLLECTION_FRESHNESS, "30"),
            (ENV_OWNER_FRESHNESS, "none"),
            (ENV_ENTITY_FRESHNESS, "15"),
            (ENV_USERS_FRESHNESS, "0"),
            (ENV_STRATEGY, "refresh"),
        ]));

        assert_eq!(config.freshness.collection, Some(Duration::from_secs(30)));
        assert_eq!(config.freshness.owner_collection, None);
        assert_eq!(config.freshness.entity, Some(Duration::from_secs(15)));
        assert_eq!(config.freshness.users, None);
        assert_eq!(config.strategy, CacheStrategy::Refresh);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            (ENV_COLLECTION_FRESHNESS, "soon"),
            (ENV_STRATEGY, "whenever"),
        ]));

        assert_eq!(config, SyncConfig::default());
    }
}

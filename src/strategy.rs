//! Read strategies.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a read treats a cache entry that is not fresh.
///
/// | Entry state | `StaleWhileRevalidate` | `Refresh` | `CacheOnly` | `Bypass` |
/// |---|---|---|---|---|
/// | fresh | cached | cached | cached | fetch |
/// | invalidated, value present | cached + background fetch | fetch | cached | fetch |
/// | aged past window | fetch | fetch | cached | fetch |
/// | absent | fetch | fetch | `NotFound` | fetch |
///
/// Every "fetch" joins an in-flight fetch for the same key when one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Serve the last value of an invalidated entry while refetching.
    #[default]
    StaleWhileRevalidate,

    /// Block on a refetch whenever the entry is not fresh.
    Refresh,

    /// Never contact the remote service.
    CacheOnly,

    /// Always fetch, then populate the cache for later readers.
    Bypass,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::StaleWhileRevalidate => write!(f, "StaleWhileRevalidate"),
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::CacheOnly => write!(f, "CacheOnly"),
            CacheStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}

impl FromStr for CacheStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "stalewhilerevalidate" | "swr" => Ok(CacheStrategy::StaleWhileRevalidate),
            "refresh" => Ok(CacheStrategy::Refresh),
            "cacheonly" => Ok(CacheStrategy::CacheOnly),
            "bypass" => Ok(CacheStrategy::Bypass),
            other => Err(Error::ConfigError(format!(
                "unknown cache strategy: {}",
                other
            ))),
        }
    }
}

//! Versioned binary envelope for cached values.
//!
//! Every encoded value is framed as:
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes, little endian] [POSTCARD PAYLOAD]
//! ```
//!
//! The encoding is deterministic, which makes it usable for comparing two
//! cached copies of the same entity or two store snapshots byte for byte.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Envelope magic header.
pub const CACHE_MAGIC: [u8; 4] = *b"CSYN";

/// Bump whenever `Post`, `User` or the snapshot layout changes shape.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Encode a value into a versioned envelope.
pub fn serialize_for_cache<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a value from a versioned envelope.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: truncated envelope or bad magic
/// - `Error::VersionMismatch`: envelope written by another schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn deserialize_from_cache<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "envelope too short: {} bytes",
            bytes.len()
        )));
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry("bad magic header".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&header[4..8]);
    let found = u32::from_le_bytes(version);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}

//! Named request/response caches.
//!
//! A [`CacheStorage`] hands out [`Cache`] handles by name, creating the cache
//! on first [`open`](CacheStorage::open). Entries are keyed by
//! [`RequestKey`]; lookups use default matching (method + URL, fragment
//! ignored, only `GET` can match).

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{Request, RequestKey};
use crate::response::Response;

pub use disk::{DiskCache, DiskStorage};
pub use memory::{MemoryCache, MemoryStorage};

/// A single named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the name this cache was opened with.
    fn name(&self) -> &str;

    /// Returns the response stored under `key`, if any.
    async fn get(&self, key: &RequestKey) -> Result<Option<Response>>;

    /// Stores every entry, replacing existing entries with the same key.
    async fn put_all(&self, entries: Vec<(RequestKey, Response)>) -> Result<()>;

    /// Removes the entry stored under `key`. Returns whether one existed.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// Returns the keys of all stored entries.
    async fn keys(&self) -> Result<Vec<RequestKey>>;

    /// Stores a single entry.
    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        self.put_all(vec![(key, response)]).await
    }

    /// Matches `request` against the cache.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        let key = request.key();
        if !key.is_matchable() {
            return Ok(None);
        }
        self.get(&key).await
    }
}

/// Registry of named caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Cache handle type handed out by [`open`](Self::open).
    type Cache: Cache;

    /// Opens the named cache, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Self::Cache>;

    /// Returns true if the named cache exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Deletes the named cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Returns the names of all existing caches.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Checks that `name` can be used as a cache name.
///
/// Names are non-empty, limited to ASCII alphanumerics, `.`, `_` and `-`,
/// and may not be `.` or `..`.
///
/// # Errors
///
/// Returns [`Error::InvalidCacheName`] if the name is rejected.
pub fn validate_cache_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if name.is_empty() || name == "." || name == ".." || !valid_chars {
        return Err(Error::InvalidCacheName(name.to_string()));
    }
    Ok(())
}

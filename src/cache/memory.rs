//! Process-local cache storage.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Cache, CacheStorage, validate_cache_name};
use crate::error::Result;
use crate::request::RequestKey;
use crate::response::Response;

type Entries = Arc<Mutex<Vec<(RequestKey, Response)>>>;

/// In-memory cache. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    name: String,
    entries: Entries,
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, response)| response.clone()))
    }

    async fn put_all(&self, new_entries: Vec<(RequestKey, Response)>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, response) in new_entries {
            match entries.iter().position(|(k, _)| *k == key) {
                Some(i) => entries[i].1 = response,
                None => entries.push((key, response)),
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().map(|(k, _)| k.clone()).collect())
    }
}

/// In-memory cache storage, keeping caches in creation order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    caches: Arc<Mutex<Vec<(String, Entries)>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    type Cache = MemoryCache;

    async fn open(&self, name: &str) -> Result<MemoryCache> {
        validate_cache_name(name)?;
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = caches
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| Arc::clone(entries));
        let entries = existing.unwrap_or_else(|| {
            let entries = Entries::default();
            caches.push((name.to_string(), Arc::clone(&entries)));
            entries
        });
        Ok(MemoryCache {
            name: name.to_string(),
            entries,
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.iter().any(|(n, _)| n == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.iter().map(|(n, _)| n.clone()).collect())
    }
}

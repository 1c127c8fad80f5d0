//! Cache storage persisted on disk.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<cache name>/<sha256 of key>.toml                 key, status, headers, body file
//! <root>/<cache name>/<sha256 of key>-<stamp>-<n>.body     raw response body
//! ```
//!
//! An entry exists exactly when its `.toml` file does. Every write puts the
//! body under a fresh name first and then atomically swaps in metadata
//! pointing at it, so readers see either the old entry or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cache, CacheStorage, validate_cache_name};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::request::RequestKey;
use crate::response::Response;

const META_EXT: &str = "toml";
const BODY_EXT: &str = "body";

#[derive(Debug, Serialize, Deserialize)]
struct HeaderEntry {
    name: String,
    value: String,
}

/// Metadata stored next to each body.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    response_url: String,
    status: u16,
    body_file: String,
    /// When the key was first inserted; kept across replacements.
    inserted_at: DateTime<Utc>,
    /// Position within the batch that inserted the key.
    seq: u64,
    stored_at: DateTime<Utc>,
    #[serde(default)]
    headers: Vec<HeaderEntry>,
}

impl EntryMeta {
    fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }
}

/// A cache stored as one directory of entry files.
#[derive(Debug)]
pub struct DiskCache<F: FileSystem = TokioFileSystem> {
    name: String,
    dir: PathBuf,
    fs: Arc<F>,
}

impl<F: FileSystem> DiskCache<F> {
    /// Directory holding this cache's entries.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.{META_EXT}", key.digest()))
    }

    async fn read_meta(&self, path: &Path) -> Result<EntryMeta> {
        let raw = self.fs.read(path).await?;
        let corrupt = |reason: String| Error::CorruptEntry {
            path: path.display().to_string(),
            reason,
        };
        let text = String::from_utf8(raw).map_err(|e| corrupt(e.to_string()))?;
        let meta: EntryMeta = toml::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        // Body files must live in this directory.
        let body = Path::new(&meta.body_file);
        if body.file_name() != Some(body.as_os_str())
            || body.extension().is_none_or(|ext| ext != BODY_EXT)
        {
            return Err(corrupt(format!("invalid body file {:?}", meta.body_file)));
        }
        Ok(meta)
    }

    /// Reads the metadata stored for `key`, if any.
    async fn stored_meta(&self, key: &RequestKey) -> Result<Option<EntryMeta>> {
        let meta_path = self.meta_path(key);
        if !self.fs.exists(&meta_path).await {
            return Ok(None);
        }
        let meta = self.read_meta(&meta_path).await?;
        if meta.key() != *key {
            log::warn!("Digest collision in {}: {key} vs {}", self.name, meta.key());
            return Ok(None);
        }
        Ok(Some(meta))
    }

    /// Removes a body file. A body that is already gone is not an error.
    async fn remove_body(&self, file: &str) -> Result<()> {
        match self.fs.remove_file(&self.dir.join(file)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Stores one entry, replacing any previous one for the same key.
    async fn store(
        &self,
        key: &RequestKey,
        response: Response,
        stored_at: DateTime<Utc>,
        seq: u64,
    ) -> Result<()> {
        let previous = match self.stored_meta(key).await {
            Ok(previous) => previous,
            Err(Error::CorruptEntry { path, reason }) => {
                log::warn!("Overwriting corrupt entry {path}: {reason}");
                None
            }
            Err(e) => return Err(e),
        };
        let (inserted_at, position) = previous
            .as_ref()
            .map_or((stored_at, seq), |p| (p.inserted_at, p.seq));
        let body_file = format!(
            "{}-{}-{seq}.{BODY_EXT}",
            key.digest(),
            stored_at.format("%Y%m%d%H%M%S%9f")
        );
        let meta = EntryMeta {
            method: key.method.clone(),
            url: key.url.clone(),
            response_url: response.url,
            status: response.status,
            body_file: body_file.clone(),
            inserted_at,
            seq: position,
            stored_at,
            headers: response
                .headers
                .into_iter()
                .map(|(name, value)| HeaderEntry { name, value })
                .collect(),
        };
        let meta_str = toml::to_string(&meta)?;

        let body_path = self.dir.join(&body_file);
        self.fs.write_atomic(&body_path, &response.body).await?;
        if let Err(e) = self.fs.write_atomic(&self.meta_path(key), meta_str.as_bytes()).await {
            if let Err(cleanup) = self.fs.remove_file(&body_path).await {
                log::warn!("Could not remove unused body {}: {cleanup}", body_path.display());
            }
            return Err(e.into());
        }
        if let Some(previous) = previous
            && previous.body_file != body_file
        {
            self.remove_body(&previous.body_file).await?;
        }
        log::debug!("Stored {key} in {}", self.name);
        Ok(())
    }
}

#[async_trait]
impl<F: FileSystem> Cache for DiskCache<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
        let Some(meta) = self.stored_meta(key).await? else {
            return Ok(None);
        };
        let body = match self.fs.read(&self.dir.join(&meta.body_file)).await {
            Ok(body) => body,
            // Replaced between reading the metadata and the body.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Entry {key} in {} changed while reading", self.name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Response {
            url: meta.response_url,
            status: meta.status,
            headers: meta
                .headers
                .into_iter()
                .map(|h| (h.name, h.value))
                .collect(),
            body: body.into(),
        }))
    }

    async fn put_all(&self, entries: Vec<(RequestKey, Response)>) -> Result<()> {
        self.fs.create_dir_all(&self.dir).await?;
        let stored_at = Utc::now();
        for (seq, (key, response)) in (0u64..).zip(entries) {
            self.store(&key, response, stored_at, seq).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let meta_path = self.meta_path(key);
        match self.stored_meta(key).await {
            Ok(None) => return Ok(false),
            // Body first: if that fails the entry is still intact.
            Ok(Some(meta)) => self.remove_body(&meta.body_file).await?,
            Err(Error::CorruptEntry { path, reason }) => {
                log::warn!("Deleting corrupt entry {path}: {reason}");
            }
            Err(e) => return Err(e),
        }
        self.fs.remove_file(&meta_path).await?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        if !self.fs.exists(&self.dir).await {
            return Ok(Vec::new());
        }
        let mut metas = Vec::new();
        for path in self.fs.list_dir(&self.dir).await? {
            if path.extension().is_none_or(|ext| ext != META_EXT) {
                continue;
            }
            match self.read_meta(&path).await {
                Ok(meta) => metas.push(meta),
                Err(Error::CorruptEntry { path, reason }) => {
                    log::warn!("Skipping corrupt entry {path} in {}: {reason}", self.name);
                }
                Err(e) => return Err(e),
            }
        }
        metas.sort_by(|a, b| {
            a.inserted_at
                .cmp(&b.inserted_at)
                .then(a.seq.cmp(&b.seq))
                .then_with(|| a.url.cmp(&b.url))
        });
        Ok(metas.iter().map(EntryMeta::key).collect())
    }
}

/// Cache storage rooted at a directory, one sub-directory per cache.
#[derive(Debug, Clone)]
pub struct DiskStorage<F: FileSystem = TokioFileSystem> {
    root: PathBuf,
    fs: Arc<F>,
}

impl DiskStorage<TokioFileSystem> {
    /// Creates a storage rooted at `root` using the default file system.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, TokioFileSystem)
    }
}

impl<F: FileSystem> DiskStorage<F> {
    /// Creates a storage with a custom file system implementation.
    #[must_use]
    pub fn with_fs(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs: Arc::new(fs),
        }
    }

    /// Root directory of this storage.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf> {
        validate_cache_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl<F: FileSystem> CacheStorage for DiskStorage<F> {
    type Cache = DiskCache<F>;

    async fn open(&self, name: &str) -> Result<DiskCache<F>> {
        let dir = self.cache_dir(name)?;
        if !self.fs.exists(&dir).await {
            log::info!("Creating cache {name} at {}", dir.display());
            self.fs.create_dir_all(&dir).await?;
        }
        Ok(DiskCache {
            name: name.to_string(),
            dir,
            fs: Arc::clone(&self.fs),
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let dir = self.cache_dir(name)?;
        Ok(self.fs.exists(&dir).await)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.cache_dir(name)?;
        if !self.fs.exists(&dir).await {
            return Ok(false);
        }
        self.fs.remove_dir_all(&dir).await?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        if !self.fs.exists(&self.root).await {
            return Ok(Vec::new());
        }
        Ok(self
            .fs
            .list_dir(&self.root)
            .await?
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .filter(|name| validate_cache_name(name).is_ok())
            .collect())
    }
}

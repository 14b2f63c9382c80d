use crate::error::{ErrorKind, Result};
use crate::key::{CacheKey, key_of, parse_source};
use crate::source::ImageSource;
use derive_more::Display;
use exn::ResultExt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use shelf_storage::BackendHandle;
use shelf_storage::error::ErrorKind as StorageErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

pub type ImageSourceHandle = Arc<dyn ImageSource + Send + Sync>;

/// Public prefix prepended to cache keys to form a [`LocalRef`].
pub const DEFAULT_PREFIX: &str = "/cache/images/";

/// A usable image reference: either a path under the cache prefix or, when
/// caching failed, the remote URL itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalRef(String);
impl LocalRef {
    /// Fall back to the remote URL.
    pub fn degraded(source: &str) -> Self {
        Self(source.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<String> for LocalRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A cover image as referenced from a record.
///
/// `source` is the only durable identity of the image and is never rewritten
/// by cache operations; `local` is what callers should display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub source: String,
    pub local: LocalRef,
}
impl ImageRef {
    /// A reference that has not been cached yet.
    pub fn uncached(source: impl Into<String>) -> Self {
        let source = source.into();
        let local = LocalRef::degraded(&source);
        Self { source, local }
    }

    /// Whether the record has an image at all.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Whether `local` points into the cache rather than at the remote URL.
    pub fn is_cached(&self) -> bool {
        !self.local.is_empty() && self.local.as_str() != self.source
    }
}

/// Aggregate numbers over every stored entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub file_count: u64,
    pub total_size: u64,
    /// Entries with a non-zero length.
    pub valid_count: u64,
}

/// One stored entry, as listed by [`ImageCache::list_entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub local: LocalRef,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    pub valid: bool,
}

enum EntryState {
    Valid(u64),
    Empty,
    Missing,
}

/// Content-addressed cache of remote images on a [`BackendHandle`].
///
/// An entry is valid when it exists and is longer than zero bytes; anything
/// else is treated as absent and replaced on the next [`ensure`](Self::ensure).
/// This type is the only writer of image entries.
pub struct ImageCache {
    store: BackendHandle,
    source: ImageSourceHandle,
    prefix: String,
}

impl ImageCache {
    pub fn new(store: BackendHandle, source: ImageSourceHandle) -> Self {
        Self { store, source, prefix: DEFAULT_PREFIX.to_string() }
    }

    /// Use a different public prefix for local references. A trailing `/` is
    /// added if missing.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = prefix;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn local_ref(&self, key: &CacheKey) -> LocalRef {
        LocalRef(format!("{}{}", self.prefix, key))
    }

    /// The cache key a local reference points at, if it points into this
    /// cache at all.
    pub fn key_in(&self, local: &LocalRef) -> Option<CacheKey> {
        local.as_str().strip_prefix(&self.prefix).and_then(CacheKey::parse)
    }

    async fn inspect(&self, key: &CacheKey) -> Result<EntryState> {
        match self.store.stat(&key.to_path()).await {
            Ok(info) if info.size > 0 => Ok(EntryState::Valid(info.size)),
            Ok(_) => Ok(EntryState::Empty),
            Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => Ok(EntryState::Missing),
            Err(e) => Err(e.raise(ErrorKind::Storage)),
        }
    }

    /// Guarantee a valid entry for `url` and return its local reference.
    ///
    /// A valid entry is a hit and costs no network call. A zero-length entry
    /// is deleted and downloaded again.
    ///
    /// # Errors
    /// [`InvalidUrl`](ErrorKind::InvalidUrl) if `url` is not absolute
    /// http(s); otherwise [`Download`](ErrorKind::Download) wrapping the
    /// transport, storage or [`Corrupt`](ErrorKind::Corrupt) cause.
    pub async fn ensure(&self, url: &str) -> Result<LocalRef> {
        let parsed = parse_source(url)?;
        let key = key_of(&parsed);
        match self.inspect(&key).await.or_raise(|| ErrorKind::Download(url.to_string()))? {
            EntryState::Valid(size) => {
                tracing::debug!(url, key = %key, size, "Image cache hit");
                return Ok(self.local_ref(&key));
            },
            EntryState::Empty => {
                tracing::warn!(url, key = %key, "Found zero-length cache entry, re-downloading");
                self.store
                    .delete_if_exists(&key.to_path())
                    .await
                    .or_raise(|| ErrorKind::Storage)
                    .or_raise(|| ErrorKind::Download(url.to_string()))?;
            },
            EntryState::Missing => {},
        }
        self.download(&parsed, &key).await.or_raise(|| ErrorKind::Download(url.to_string()))?;
        Ok(self.local_ref(&key))
    }

    async fn download(&self, url: &Url, key: &CacheKey) -> Result<u64> {
        let bytes = self.source.fetch(url).await?;
        if bytes.is_empty() {
            exn::bail!(ErrorKind::EmptyBody);
        }

        let path = key.to_path();
        if let Err(e) = self.store.write(&path, &bytes).await {
            self.discard(&path).await;
            return Err(e.raise(ErrorKind::Storage));
        }
        let written = match self.store.size_of(&path).await {
            Ok(size) => size,
            Err(e) => {
                self.discard(&path).await;
                return Err(e.raise(ErrorKind::Storage));
            },
        };
        if written == 0 {
            self.discard(&path).await;
            exn::bail!(ErrorKind::Corrupt(key.to_string()));
        }

        tracing::info!(url = %url, key = %key, size = written, "Cached image");
        Ok(written)
    }

    /// Best-effort removal of a partial entry.
    async fn discard(&self, path: &Path) {
        if let Err(e) = self.store.delete_if_exists(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial cache entry");
        }
    }

    /// Re-validate a known local reference.
    ///
    /// A reference to a valid entry comes back unchanged. Otherwise the image
    /// is fetched again from `source`; without a source there is nothing to
    /// repair from and `local` is returned as-is, valid or not.
    pub async fn repair(&self, local: &LocalRef, source: Option<&str>) -> Result<LocalRef> {
        if let Some(key) = self.key_in(local) {
            let state = self.inspect(&key).await.or_raise(|| ErrorKind::Download(local.to_string()))?;
            if let EntryState::Valid(_) = state {
                return Ok(local.clone());
            }
        }
        match source.filter(|source| !source.is_empty()) {
            Some(source) => {
                tracing::info!(local = %local, source, "Repairing image reference");
                self.ensure(source).await
            },
            None => {
                tracing::debug!(local = %local, "No source to repair from, leaving reference unchanged");
                Ok(local.clone())
            },
        }
    }

    /// Turn whatever a caller holds into a valid local reference: a cache
    /// path is checked, anything else is treated as a source URL and cached.
    ///
    /// # Errors
    /// [`Corrupt`](ErrorKind::Corrupt) for a cache path whose entry is gone
    /// or empty, since there is no source to heal it from.
    pub async fn resolve(&self, reference: &str) -> Result<LocalRef> {
        let local = LocalRef(reference.to_string());
        match self.key_in(&local) {
            Some(key) => match self.inspect(&key).await? {
                EntryState::Valid(_) => Ok(local),
                EntryState::Empty | EntryState::Missing => exn::bail!(ErrorKind::Corrupt(key.to_string())),
            },
            None => self.ensure(reference).await,
        }
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for info in self.store.list(None).await.or_raise(|| ErrorKind::Storage)? {
            stats.file_count += 1;
            stats.total_size += info.size;
            if info.size > 0 {
                stats.valid_count += 1;
            }
        }
        Ok(stats)
    }

    /// Every stored entry, most recently modified first.
    pub async fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self
            .store
            .list(None)
            .await
            .or_raise(|| ErrorKind::Storage)?
            .into_iter()
            .filter_map(|info| {
                let key = info.name()?.to_string();
                Some(CacheEntry {
                    local: LocalRef(format!("{}{}", self.prefix, key)),
                    key,
                    size: info.size,
                    modified: info.modified,
                    valid: info.size > 0,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    /// Delete the named entries. Names may be bare keys or local references;
    /// names that do not exist are skipped.
    pub async fn purge_named(&self, names: &[String]) -> Result<u64> {
        let paths = names
            .iter()
            .map(|name| {
                let key = name.strip_prefix(&self.prefix).unwrap_or(name);
                shelf_storage::validate_segment(key).map(PathBuf::from).or_raise(|| ErrorKind::Storage)
            })
            .collect::<Result<Vec<_>>>()?;
        self.store.purge_named(&paths).await.or_raise(|| ErrorKind::Storage)
    }

    /// Delete entries last modified more than `age` ago.
    pub async fn purge_older_than(&self, age: Duration) -> Result<u64> {
        self.store.purge_older_than(None, age).await.or_raise(|| ErrorKind::Storage)
    }
}

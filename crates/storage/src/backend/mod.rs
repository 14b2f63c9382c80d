//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the blob store every other
//! shelf crate writes through: a flat-ish key space of relative paths with
//! get/put/delete, listing and size lookup. Zero-length detection is part of
//! the contract; [`stat`](StorageBackend::stat) must report the real size.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use time::OffsetDateTime;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All operations are asynchronous. Paths are relative to the backend root
/// and are validated with [`validate_path`](crate::validate_path) by every
/// implementation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::{backend::StorageBackend, error::Result};
///
/// async fn cached_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("4f2c9a.jpg");
///     if backend.exists(path).await? {
///         backend.size_of(path).await
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Prefix matching is component-based: `pages/ahbei` matches
    /// `pages/ahbei/movie_done_0.json` but not `pages/ahbei2/...`. A prefix
    /// that does not exist yields an empty stream, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use shelf_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("pages/ahbei")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, creating or replacing the file.
    ///
    /// Implementations create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Size of a stored file in bytes.
    async fn size_of(&self, path: &Path) -> Result<u64> {
        Ok(self.stat(path).await?.size)
    }

    /// Delete a file, treating "already gone" as success.
    ///
    /// Returns `true` if this call removed the file.
    async fn delete_if_exists(&self, path: &Path) -> Result<bool> {
        match self.delete(path).await {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.deref(), ErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete an explicit list of files, returning how many were removed.
    ///
    /// Names that do not exist are skipped silently.
    async fn purge_named(&self, names: &[PathBuf]) -> Result<u64> {
        let mut deleted = 0;
        for name in names {
            if self.delete_if_exists(name).await? {
                tracing::info!(backend = self.name(), path = %name.display(), "Purged file by name");
                deleted += 1;
            }
        }
        tracing::info!(backend = self.name(), deleted, requested = names.len(), "Purge by name complete");
        Ok(deleted)
    }

    /// Delete every file (under an optional prefix) last modified more than
    /// `age` ago, returning how many were removed.
    async fn purge_older_than(&self, prefix: Option<&Path>, age: Duration) -> Result<u64> {
        let Some(cutoff) = time::Duration::try_from(age)
            .ok()
            .and_then(|age| OffsetDateTime::now_utc().checked_sub(age))
        else {
            // Older than the representable past: nothing can qualify.
            return Ok(0);
        };
        let mut deleted = 0;
        for info in self.list(prefix).await? {
            if info.modified < cutoff && self.delete_if_exists(&info.path).await? {
                tracing::debug!(backend = self.name(), path = %info.path.display(), "Purged expired file");
                deleted += 1;
            }
        }
        tracing::info!(backend = self.name(), deleted, max_age_secs = age.as_secs(), "Purge by age complete");
        Ok(deleted)
    }
}

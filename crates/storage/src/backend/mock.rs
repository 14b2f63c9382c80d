//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files live in a `HashMap` behind a [`RwLock`], so every trait method works
/// on `&self`. Besides the trait, it exposes a few helpers for tests that need
/// to tamper with storage behind a component's back (truncating an entry,
/// ageing it, counting writes).
///
/// # Examples
///
/// ```
/// use shelf_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("4f2c.jpg", b"\xFF\xD8")]);
/// assert!(backend.exists(Path::new("4f2c.jpg")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    writes: RwLock<u64>,
    read_only: RwLock<Vec<PathBuf>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation: a broken test setup should not
    /// pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            writes: RwLock::new(0),
            read_only: RwLock::new(Vec::new()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace a file's contents without counting it as a write, e.g. to
    /// simulate truncation by an outside process.
    ///
    /// Panics if the path is invalid.
    pub async fn tamper(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = validate_path(path.as_ref()).expect("MockBackend::tamper: invalid path");
        let mut guard = self.storage.write().await;
        let modified = guard.get(&path).map(|(modified, _)| *modified).unwrap_or_else(OffsetDateTime::now_utc);
        guard.insert(path, (modified, data.into()));
    }

    /// Override a file's modification time.
    ///
    /// Panics if the file does not exist.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: OffsetDateTime) {
        let path = validate_path(path.as_ref()).expect("MockBackend::set_modified: invalid path");
        let mut guard = self.storage.write().await;
        let entry = guard.get_mut(&path).expect("MockBackend::set_modified: no such file");
        entry.0 = modified;
    }

    /// Number of successful [`write`](StorageBackend::write) calls so far.
    pub async fn write_count(&self) -> u64 {
        *self.writes.read().await
    }

    /// Make every write below `prefix` fail with a backend error, e.g. to
    /// simulate a full or read-only disk.
    pub async fn fail_writes_under(&self, prefix: impl Into<PathBuf>) {
        self.read_only.write().await.push(prefix.into());
    }

    /// Number of files currently stored.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Whether the backend holds no files.
    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        if self.read_only.read().await.iter().any(|prefix| path.starts_with(prefix)) {
            exn::bail!(ErrorKind::BackendError(format!("writes refused under {}", path.display())));
        }
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        *self.writes.write().await += 1;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("snapshots/ahbei.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("snapshots/ahbei.json")).await.unwrap(), b"{}");
        assert_eq!(backend.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_writes_keep_existing_file() {
        let backend = MockBackend::with_files([("snapshots/ahbei.json", "old")]);
        backend.fail_writes_under("snapshots").await;
        let err = backend.write(Path::new("snapshots/ahbei.json"), b"new").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BackendError(_)));
        assert_eq!(backend.read(Path::new("snapshots/ahbei.json")).await.unwrap(), b"old");
        backend.write(Path::new("pages/ahbei/movie_done_0.json"), b"{}").await.unwrap();
        assert_eq!(backend.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tamper_truncates_without_counting() {
        let backend = MockBackend::with_files([("a.jpg", Vec::from(*b"bytes"))]);
        backend.tamper("a.jpg", Vec::new()).await;
        assert_eq!(backend.size_of(Path::new("a.jpg")).await.unwrap(), 0);
        assert_eq!(backend.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("pages/ahbei/movie_done_0.json", Vec::from(*b"a")),
            ("pages/ahbei/book_done_0.json", Vec::from(*b"b")),
            ("pages/other/book_done_0.json", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("pages/ahbei"))).await.unwrap();
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let backend = MockBackend::with_files([("old.jpg", Vec::from(*b"a")), ("new.jpg", Vec::from(*b"b"))]);
        backend.set_modified("old.jpg", OffsetDateTime::now_utc() - time::Duration::days(40)).await;
        let purged = backend.purge_older_than(None, Duration::from_secs(30 * 24 * 3600)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(!backend.exists(Path::new("old.jpg")).await.unwrap());
        assert!(backend.exists(Path::new("new.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_older_than_respects_prefix() {
        let backend = MockBackend::with_files([("keep/old.jpg", Vec::from(*b"a")), ("drop/old.jpg", Vec::from(*b"b"))]);
        let long_ago = OffsetDateTime::now_utc() - time::Duration::days(400);
        backend.set_modified("keep/old.jpg", long_ago).await;
        backend.set_modified("drop/old.jpg", long_ago).await;
        let purged = backend.purge_older_than(Some(Path::new("drop")), Duration::from_secs(60)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(backend.exists(Path::new("keep/old.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}

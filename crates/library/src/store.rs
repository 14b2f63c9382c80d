use crate::error::{ErrorKind, Result};
use crate::models::Snapshot;
use exn::ResultExt;
use shelf_storage::BackendHandle;
use shelf_storage::error::ErrorKind as StorageErrorKind;
use shelf_upstream::{Page, PageRequest};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::instrument;

const SNAPSHOTS: &str = "snapshots";
const PAGES: &str = "pages";

/// JSON persistence for snapshots and raw page archives.
///
/// Layout below the backend root:
///
/// ```text
/// snapshots/<uid>.json
/// pages/<uid>/<category>_<status>_<offset>.json
/// ```
#[derive(Clone)]
pub struct SnapshotStore {
    backend: BackendHandle,
}

impl SnapshotStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    /// Reject anything that would not be a single path segment.
    pub fn validate_uid(uid: &str) -> Result<&str> {
        shelf_storage::validate_segment(uid).or_raise(|| ErrorKind::InvalidUser(uid.to_string()))
    }

    fn snapshot_path(uid: &str) -> Result<PathBuf> {
        Ok(Path::new(SNAPSHOTS).join(format!("{}.json", Self::validate_uid(uid)?)))
    }

    fn pages_dir(uid: &str) -> Result<PathBuf> {
        Ok(Path::new(PAGES).join(Self::validate_uid(uid)?))
    }

    #[instrument(skip_all, fields(uid = %snapshot.uid))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = Self::snapshot_path(&snapshot.uid)?;
        let json = serde_json::to_vec_pretty(snapshot).or_raise(|| ErrorKind::Persistence)?;
        self.backend.write(&path, &json).await.or_raise(|| ErrorKind::Persistence)?;
        tracing::debug!(bytes = json.len(), "Saved snapshot");
        Ok(())
    }

    /// Load a persisted snapshot; `None` if the user has none.
    pub async fn load(&self, uid: &str) -> Result<Option<Snapshot>> {
        let path = Self::snapshot_path(uid)?;
        let bytes = match self.backend.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.raise(ErrorKind::Persistence)),
        };
        serde_json::from_slice(&bytes).map(Some).or_raise(|| ErrorKind::Persistence)
    }

    /// Returns `true` if a snapshot was removed.
    pub async fn delete_snapshot(&self, uid: &str) -> Result<bool> {
        let path = Self::snapshot_path(uid)?;
        self.backend.delete_if_exists(&path).await.or_raise(|| ErrorKind::Persistence)
    }

    /// Remove every archived page of a user, returning how many were removed.
    pub async fn delete_pages(&self, uid: &str) -> Result<u64> {
        let dir = Self::pages_dir(uid)?;
        let files = self.backend.list(Some(&dir)).await.or_raise(|| ErrorKind::Persistence)?;
        let mut deleted = 0;
        for file in files {
            if self.backend.delete_if_exists(&file.path).await.or_raise(|| ErrorKind::Persistence)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Remove the snapshot and every page archive of a user.
    #[instrument(skip(self))]
    pub async fn delete_all(&self, uid: &str) -> Result<()> {
        let snapshot = self.delete_snapshot(uid).await?;
        let pages = self.delete_pages(uid).await?;
        tracing::info!(snapshot, pages, "Removed user data");
        Ok(())
    }

    pub async fn save_page(&self, request: &PageRequest, page: &Page) -> Result<()> {
        let name = format!("{}_{}_{}.json", request.category, request.status, request.offset);
        let path = Self::pages_dir(&request.uid)?.join(name);
        let json = serde_json::to_vec(page).or_raise(|| ErrorKind::Persistence)?;
        self.backend.write(&path, &json).await.or_raise(|| ErrorKind::Persistence)
    }

    /// Archived pages of a user, sorted by path.
    pub async fn pages(&self, uid: &str) -> Result<Vec<PathBuf>> {
        let dir = Self::pages_dir(uid)?;
        let mut paths: Vec<_> = self
            .backend
            .list(Some(&dir))
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .into_iter()
            .map(|file| file.path)
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Every user with a persisted snapshot, sorted.
    pub async fn users(&self) -> Result<Vec<String>> {
        let files = self.backend.list(Some(Path::new(SNAPSHOTS))).await.or_raise(|| ErrorKind::Persistence)?;
        let mut users: Vec<String> = files
            .iter()
            .filter_map(|file| file.name()?.strip_suffix(".json").map(str::to_string))
            .collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Items;
    use shelf_storage::backend::{LocalBackend, MockBackend, StorageBackend};
    use shelf_upstream::{Category, RawRecord, Status};
    use std::sync::Arc;

    fn store() -> (Arc<MockBackend>, SnapshotStore) {
        let backend = Arc::new(MockBackend::default());
        (backend.clone(), SnapshotStore::new(backend))
    }

    fn request(uid: &str, offset: u64) -> PageRequest {
        PageRequest { uid: uid.to_string(), category: Category::Book, status: Status::Doing, offset, limit: 50 }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (backend, store) = store();
        let snapshot = Snapshot::new("ahbei", Items::default());
        store.save(&snapshot).await.unwrap();
        assert!(backend.exists(Path::new("snapshots/ahbei.json")).await.unwrap());
        assert_eq!(store.load("ahbei").await.unwrap(), Some(snapshot));
        assert_eq!(store.load("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let backend = Arc::new(MockBackend::with_files([("snapshots/ahbei.json", Vec::from(*b"{not json"))]));
        let store = SnapshotStore::new(backend);
        let err = store.load("ahbei").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Persistence));
    }

    #[tokio::test]
    async fn test_invalid_uid() {
        let (_backend, store) = store();
        let err = store.load("../etc").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUser(_)));
        assert!(store.delete_all("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_pages_and_delete_all() {
        let (backend, store) = store();
        let page = Page { total: 1, records: vec![RawRecord::titled("Dune")] };
        store.save_page(&request("ahbei", 0), &page).await.unwrap();
        store.save_page(&request("ahbei", 50), &page).await.unwrap();
        store.save_page(&request("ahbei2", 0), &page).await.unwrap();
        store.save(&Snapshot::new("ahbei", Items::default())).await.unwrap();

        assert_eq!(
            store.pages("ahbei").await.unwrap(),
            [PathBuf::from("pages/ahbei/book_doing_0.json"), PathBuf::from("pages/ahbei/book_doing_50.json")]
        );

        store.delete_all("ahbei").await.unwrap();
        assert!(store.pages("ahbei").await.unwrap().is_empty());
        assert_eq!(store.load("ahbei").await.unwrap(), None);
        assert_eq!(store.pages("ahbei2").await.unwrap().len(), 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_users() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new("data", dir.path()).unwrap());
        let store = SnapshotStore::new(backend);
        assert!(store.users().await.unwrap().is_empty());
        for uid in ["zed", "ahbei"] {
            store.save(&Snapshot::new(uid, Items::default())).await.unwrap();
        }
        store.save_page(&request("ahbei", 0), &Page::default()).await.unwrap();
        assert_eq!(store.users().await.unwrap(), ["ahbei", "zed"]);
    }
}

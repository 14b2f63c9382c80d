use crate::archive::ArchivingSource;
use crate::classify::{Classifier, MarkerClassifier};
use crate::error::{ErrorKind, Result};
use crate::models::{Detail, Item, Items, Snapshot};
use crate::store::SnapshotStore;
use exn::ResultExt;
use futures::TryStreamExt;
use shelf_images::{BatchFetcher, BatchOptions, ImageCache, ImageRef, LocalRef, Mode};
use shelf_upstream::{Category, CollectionSource, DEFAULT_PAGE_SIZE, SourceHandle, Status, walk};
use std::pin::pin;
use std::sync::Arc;
use tracing::instrument;

/// Produces one canonical [`Snapshot`] per user.
///
/// Walks are strictly sequential in a fixed order: movie then book, and
/// within each category done, doing, mark. Image work happens afterwards, in
/// bounded parallel groups through a [`BatchFetcher`].
pub struct Reconciler {
    source: SourceHandle,
    store: SnapshotStore,
    images: Arc<ImageCache>,
    batch: BatchOptions,
    classifier: Arc<dyn Classifier>,
    page_size: u64,
    archive_pages: bool,
}

impl Reconciler {
    pub fn new(source: SourceHandle, store: SnapshotStore, images: Arc<ImageCache>) -> Self {
        Self {
            source,
            store,
            images,
            batch: BatchOptions::default(),
            classifier: Arc::new(MarkerClassifier::default()),
            page_size: DEFAULT_PAGE_SIZE,
            archive_pages: true,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    /// Whether raw upstream pages are archived while walking.
    pub fn with_page_archive(mut self, enabled: bool) -> Self {
        self.archive_pages = enabled;
        self
    }

    fn fetcher(&self) -> BatchFetcher {
        BatchFetcher::new(self.images.clone(), self.batch.clone())
    }

    /// Rebuild a user's snapshot from scratch.
    ///
    /// Stale page archives are cleared first. The previous snapshot is only
    /// replaced once every collection has been walked; an upstream failure
    /// leaves it untouched and persists nothing. Image failures never fail
    /// the build, the affected items keep their remote URL.
    #[instrument(skip(self))]
    pub async fn build_full(&self, uid: &str) -> Result<Snapshot> {
        SnapshotStore::validate_uid(uid)?;
        let cleared = self.store.delete_pages(uid).await?;
        tracing::debug!(pages = cleared, "Cleared stale page archives");

        let archiving = ArchivingSource::new(self.source.clone(), self.store.clone());
        let source: &dyn CollectionSource = match self.archive_pages {
            true => &archiving,
            false => self.source.as_ref(),
        };

        let mut items = Items::default();
        for category in Category::ALL {
            for status in Status::ALL {
                let before = items.len();
                let mut records = pin!(walk(source, uid, category, status, self.page_size));
                while let Some(record) = records.try_next().await.or_raise(|| ErrorKind::Upstream)? {
                    let kind = self.classifier.classify(category, &record);
                    items.push(Item::from_record(&record, status, kind));
                }
                tracing::info!(%category, %status, records = items.len() - before, "Collection fetched");
            }
        }

        let refs: Vec<ImageRef> = items.iter().map(|item| item.image.clone()).filter(|i| !i.is_empty()).collect();
        let resolved = self.fetcher().run(&refs, Mode::Populate).await;
        let mut snapshot = Snapshot::new(uid, items);
        snapshot.apply_images(&resolved);

        // Overwrites in place; the previous snapshot survives a failed save.
        self.store.save(&snapshot).await?;
        tracing::info!(
            movies = snapshot.items.movies.len(),
            tv_shows = snapshot.items.tv_shows.len(),
            books = snapshot.items.books.len(),
            "Snapshot built"
        );
        Ok(snapshot)
    }

    /// Load the persisted snapshot, building one if there is none.
    ///
    /// With `validate_images`, every image reference is re-checked against
    /// the cache and repaired from its source where needed; the snapshot is
    /// re-persisted only if a reference changed.
    #[instrument(skip(self))]
    pub async fn load_or_build(&self, uid: &str, validate_images: bool) -> Result<Snapshot> {
        let Some(mut snapshot) = self.store.load(uid).await? else {
            tracing::info!("No snapshot found, building");
            return self.build_full(uid).await;
        };
        if validate_images {
            let refs: Vec<ImageRef> = snapshot.images().cloned().collect();
            let resolved = self.fetcher().run(&refs, Mode::Validate).await;
            let changed = snapshot.apply_images(&resolved);
            if changed > 0 {
                self.store.save(&snapshot).await?;
            }
            tracing::info!(checked = refs.len(), changed, "Validated snapshot images");
        }
        Ok(snapshot)
    }

    /// Delete a user's snapshot and page archives.
    pub async fn remove(&self, uid: &str) -> Result<()> {
        self.store.delete_all(uid).await
    }

    /// Users with a persisted snapshot.
    pub async fn users(&self) -> Result<Vec<String>> {
        self.store.users().await
    }

    /// Look up one subject and make sure its cover is cached.
    #[instrument(skip(self))]
    pub async fn detail(&self, category: Category, id: &str) -> Result<Detail> {
        let raw = self.source.fetch_detail(category, id).await.or_raise(|| ErrorKind::Upstream)?;
        let mut image = match raw.image() {
            "" => ImageRef::default(),
            url => ImageRef::uncached(url),
        };
        if !image.is_empty() {
            image.local = match self.images.ensure(&image.source).await {
                Ok(local) => local,
                Err(e) => {
                    tracing::warn!(source = %image.source, error = %e, "Image unavailable, falling back to remote URL");
                    LocalRef::degraded(&image.source)
                },
            };
        }
        Ok(Detail { id: id.to_string(), category, name: raw.title().to_string(), rating: raw.rating(), image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Kind;
    use shelf_images::MockImageSource;
    use shelf_storage::backend::{MockBackend, StorageBackend};
    use shelf_upstream::{MockSource, RawDetail, RawRecord};
    use std::time::Duration;

    const UID: &str = "ahbei";

    struct Fixture {
        upstream: Arc<MockSource>,
        data: Arc<MockBackend>,
        image_store: Arc<MockBackend>,
        image_source: Arc<MockImageSource>,
        images: Arc<ImageCache>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let upstream = Arc::new(MockSource::default());
        let data = Arc::new(MockBackend::default());
        let image_store = Arc::new(MockBackend::default());
        let image_source = Arc::new(MockImageSource::default());
        let images = Arc::new(ImageCache::new(image_store.clone(), image_source.clone()));
        let reconciler = Reconciler::new(upstream.clone(), SnapshotStore::new(data.clone()), images.clone())
            .with_page_size(2)
            .with_batch_options(BatchOptions { pause: Duration::ZERO, ..Default::default() });
        Fixture { upstream, data, image_store, image_source, images, reconciler }
    }

    fn record(name: &str) -> RawRecord {
        RawRecord::titled(name).with_image(format!("https://img.example/{name}.jpg"))
    }

    fn tv(name: &str) -> RawRecord {
        record(name).with_subtitle("2019 / 美国 / 电视剧")
    }

    /// Movies: 3 done (one TV), 1 doing (TV), 2 mark. Books: 2 done, 1 mark.
    fn populate(upstream: &MockSource) {
        upstream.insert(UID, Category::Movie, Status::Done, [record("m1"), tv("t1"), record("m2")]);
        upstream.insert(UID, Category::Movie, Status::Doing, [tv("t2")]);
        upstream.insert(UID, Category::Movie, Status::Mark, [record("m3"), record("m4")]);
        upstream.insert(UID, Category::Book, Status::Done, [record("b1"), record("b2")]);
        upstream.insert(UID, Category::Book, Status::Mark, [record("b3")]);
    }

    fn names(snapshot: &Snapshot, kind: Kind) -> Vec<&str> {
        snapshot.items(kind, None).map(|item| item.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_build_full() {
        let fx = fixture();
        populate(&fx.upstream);
        let snapshot = fx.reconciler.build_full(UID).await.unwrap();

        assert_eq!(names(&snapshot, Kind::Movie), ["m1", "m2", "m3", "m4"]);
        assert_eq!(names(&snapshot, Kind::TvShow), ["t1", "t2"]);
        assert_eq!(names(&snapshot, Kind::Book), ["b1", "b2", "b3"]);
        assert_eq!(snapshot.stats.total(Kind::Movie) + snapshot.stats.total(Kind::TvShow), 6);
        assert_eq!(snapshot.stats.tv_shows.doing, 1);
        assert_eq!(snapshot.stats.books.mark, 1);
        assert!(snapshot.images().all(ImageRef::is_cached));
        assert_eq!(fx.image_source.call_count(), 9);
        assert_eq!(fx.reconciler.store.load(UID).await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_walk_order_is_fixed() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.reconciler.build_full(UID).await.unwrap();
        let order: Vec<_> = fx.upstream.requests().iter().map(|r| (r.category, r.status, r.offset)).collect();
        assert_eq!(
            order,
            [
                (Category::Movie, Status::Done, 0),
                (Category::Movie, Status::Done, 2),
                (Category::Movie, Status::Doing, 0),
                (Category::Movie, Status::Mark, 0),
                (Category::Book, Status::Done, 0),
                (Category::Book, Status::Doing, 0),
                (Category::Book, Status::Mark, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_status_order_within_kind() {
        let fx = fixture();
        fx.upstream.insert(UID, Category::Movie, Status::Mark, [record("later")]);
        fx.upstream.insert(UID, Category::Movie, Status::Done, [record("seen")]);
        fx.upstream.insert(UID, Category::Movie, Status::Doing, [record("now")]);
        let snapshot = fx.reconciler.build_full(UID).await.unwrap();
        assert_eq!(names(&snapshot, Kind::Movie), ["seen", "now", "later"]);
    }

    #[tokio::test]
    async fn test_pages_are_archived() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.reconciler.build_full(UID).await.unwrap();
        assert_eq!(fx.reconciler.store.pages(UID).await.unwrap().len(), 7);

        let without = Reconciler::new(fx.upstream.clone(), SnapshotStore::new(fx.data.clone()), fx.images.clone())
            .with_page_archive(false);
        without.build_full(UID).await.unwrap();
        assert!(without.store.pages(UID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_image_degrades() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.image_source.fail("https://img.example/m2.jpg");
        let snapshot = fx.reconciler.build_full(UID).await.unwrap();

        let m2 = snapshot.items(Kind::Movie, None).find(|item| item.name == "m2").unwrap();
        assert_eq!(m2.image.local.as_str(), "https://img.example/m2.jpg");
        assert!(!m2.image.is_cached());
        assert_eq!(snapshot.images().filter(|i| i.is_cached()).count(), 8);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_snapshot() {
        let fx = fixture();
        populate(&fx.upstream);
        let previous = fx.reconciler.build_full(UID).await.unwrap();

        fx.upstream.insert(UID, Category::Book, Status::Done, [record("b9")]);
        fx.upstream.fail_from(UID, Category::Book, Status::Mark, 0);
        let err = fx.reconciler.build_full(UID).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upstream));
        assert_eq!(fx.reconciler.store.load(UID).await.unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_snapshot() {
        let fx = fixture();
        populate(&fx.upstream);
        let previous = fx.reconciler.build_full(UID).await.unwrap();

        fx.upstream.insert(UID, Category::Book, Status::Doing, [record("b9")]);
        fx.data.fail_writes_under("snapshots").await;
        let err = fx.reconciler.build_full(UID).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Persistence));
        assert_eq!(fx.reconciler.store.load(UID).await.unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn test_validate_repairs_exactly_one() {
        let fx = fixture();
        populate(&fx.upstream);
        let built = fx.reconciler.build_full(UID).await.unwrap();
        let before_bytes = fx.data.read(std::path::Path::new("snapshots/ahbei.json")).await.unwrap();
        let writes_before = fx.image_store.write_count().await;

        let victim = built.items.books[1].image.clone();
        let key = fx.images.key_in(&victim.local).unwrap();
        fx.image_store.delete(&key.to_path()).await.unwrap();

        let validated = fx.reconciler.load_or_build(UID, true).await.unwrap();
        assert_eq!(validated, built);
        assert_eq!(fx.image_store.write_count().await, writes_before + 1);
        assert_eq!(fx.image_source.calls_for(&victim.source), 2);
        assert!(fx.image_store.exists(&key.to_path()).await.unwrap());
        let after_bytes = fx.data.read(std::path::Path::new("snapshots/ahbei.json")).await.unwrap();
        assert_eq!(before_bytes, after_bytes);
    }

    #[tokio::test]
    async fn test_validate_upgrades_degraded_reference() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.image_source.fail("https://img.example/b1.jpg");
        fx.reconciler.build_full(UID).await.unwrap();

        fx.image_source.recover("https://img.example/b1.jpg");
        let validated = fx.reconciler.load_or_build(UID, true).await.unwrap();
        assert!(validated.items.books[0].image.is_cached());
        let persisted = fx.reconciler.store.load(UID).await.unwrap().unwrap();
        assert!(persisted.items.books[0].image.is_cached());
    }

    #[tokio::test]
    async fn test_load_without_validation_skips_images() {
        let fx = fixture();
        populate(&fx.upstream);
        let built = fx.reconciler.build_full(UID).await.unwrap();
        let calls = fx.image_source.call_count();
        let requests = fx.upstream.requests().len();

        let key = fx.images.key_in(&built.items.movies[0].image.local).unwrap();
        fx.image_store.tamper(key.to_path(), Vec::new()).await;
        assert_eq!(fx.reconciler.load_or_build(UID, false).await.unwrap(), built);
        assert_eq!(fx.image_source.call_count(), calls);
        assert_eq!(fx.upstream.requests().len(), requests);
    }

    #[tokio::test]
    async fn test_remove_then_load_rebuilds() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.reconciler.build_full(UID).await.unwrap();
        let requests = fx.upstream.requests().len();

        fx.reconciler.remove(UID).await.unwrap();
        assert_eq!(fx.reconciler.store.load(UID).await.unwrap(), None);
        assert!(fx.reconciler.store.pages(UID).await.unwrap().is_empty());

        fx.upstream.insert(UID, Category::Book, Status::Doing, [record("fresh")]);
        let rebuilt = fx.reconciler.load_or_build(UID, false).await.unwrap();
        assert_eq!(fx.upstream.requests().len(), requests * 2);
        assert!(names(&rebuilt, Kind::Book).contains(&"fresh"));
    }

    #[tokio::test]
    async fn test_users() {
        let fx = fixture();
        populate(&fx.upstream);
        fx.reconciler.build_full(UID).await.unwrap();
        fx.reconciler.build_full("zed").await.unwrap();
        assert_eq!(fx.reconciler.users().await.unwrap(), ["ahbei", "zed"]);
    }

    #[tokio::test]
    async fn test_invalid_uid_makes_no_requests() {
        let fx = fixture();
        let err = fx.reconciler.build_full("../ahbei").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUser(_)));
        assert!(fx.upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_detail() {
        let fx = fixture();
        fx.upstream.insert_detail(
            Category::Movie,
            "1292052",
            RawDetail {
                title: Some("The Shawshank Redemption".to_string()),
                pic: Some(shelf_upstream::models::RawPicture { normal: Some("https://img.example/s.jpg".to_string()) }),
                rating: Some(shelf_upstream::models::RawRating { value: Some(9.7) }),
            },
        );
        let detail = fx.reconciler.detail(Category::Movie, "1292052").await.unwrap();
        assert_eq!(detail.name, "The Shawshank Redemption");
        assert_eq!(detail.rating, 9.7);
        assert!(detail.image.is_cached());

        let err = fx.reconciler.detail(Category::Book, "404").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upstream));
    }
}

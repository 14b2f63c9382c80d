//! Page-archiving collection source.
//!
//! Wraps another [`CollectionSource`] and writes every page it returns to the
//! [`SnapshotStore`] page archive before handing it on.

use crate::store::SnapshotStore;
use async_trait::async_trait;
use shelf_upstream::error::Result;
use shelf_upstream::{Category, CollectionSource, Page, PageRequest, RawDetail, SourceHandle};

/// Archiving decorator around a [`SourceHandle`].
///
/// Archive failures are logged and otherwise ignored: pages are intermediate
/// artifacts and never block a reconciliation.
#[derive(Clone)]
pub struct ArchivingSource {
    inner: SourceHandle,
    store: SnapshotStore,
}
impl ArchivingSource {
    pub fn new(inner: SourceHandle, store: SnapshotStore) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl CollectionSource for ArchivingSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let page = self.inner.fetch_page(request).await?;
        if let Err(e) = self.store.save_page(request, &page).await {
            tracing::warn!(
                uid = %request.uid,
                category = %request.category,
                status = %request.status,
                offset = request.offset,
                error = %e,
                "Failed to archive collection page"
            );
        }
        Ok(page)
    }

    async fn fetch_detail(&self, category: Category, id: &str) -> Result<RawDetail> {
        self.inner.fetch_detail(category, id).await
    }
}

//! In-memory collection source for testing.

use crate::CollectionSource;
use crate::error::{ErrorKind, Result};
use crate::models::{Category, Page, PageRequest, RawDetail, RawRecord, Status};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type CollectionKey = (String, Category, Status);

#[derive(Default)]
struct State {
    collections: HashMap<CollectionKey, Vec<RawRecord>>,
    claimed_totals: HashMap<CollectionKey, u64>,
    failures: HashMap<CollectionKey, u64>,
    details: HashMap<(Category, String), RawDetail>,
    requests: Vec<PageRequest>,
}

/// In-memory [`CollectionSource`] for testing.
///
/// Collections are slices of records served page by page; every request is
/// recorded so tests can assert on the exact request sequence. Any collection
/// can be told to fail from a given offset onward, which is how callers
/// exercise the "upstream went away mid-walk" path.
#[derive(Default)]
pub struct MockSource {
    state: Mutex<State>,
}

impl MockSource {
    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `records` for the given collection, replacing anything already
    /// there.
    pub fn insert(&self, uid: &str, category: Category, status: Status, records: impl IntoIterator<Item = RawRecord>) {
        self.state().collections.insert((uid.to_string(), category, status), records.into_iter().collect());
    }

    /// Report `total` for the collection regardless of how many records it
    /// actually holds.
    pub fn set_reported_total(&self, uid: &str, category: Category, status: Status, total: u64) {
        self.state().claimed_totals.insert((uid.to_string(), category, status), total);
    }

    /// Fail every page request for the collection at or after `offset`.
    pub fn fail_from(&self, uid: &str, category: Category, status: Status, offset: u64) {
        self.state().failures.insert((uid.to_string(), category, status), offset);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn insert_detail(&self, category: Category, id: &str, detail: RawDetail) {
        self.state().details.insert((category, id.to_string()), detail);
    }

    /// Every page request received so far, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl CollectionSource for MockSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let mut state = self.state();
        state.requests.push(request.clone());

        let key = (request.uid.clone(), request.category, request.status);
        if state.failures.get(&key).is_some_and(|from| request.offset >= *from) {
            exn::bail!(ErrorKind::Status(503));
        }

        let records = state.collections.get(&key).map(Vec::as_slice).unwrap_or_default();
        let start = usize::try_from(request.offset).unwrap_or(usize::MAX).min(records.len());
        let end = usize::try_from(request.limit).unwrap_or(usize::MAX).saturating_add(start).min(records.len());
        let total = state.claimed_totals.get(&key).copied().unwrap_or(records.len() as u64);
        Ok(Page { total, records: records[start..end].to_vec() })
    }

    async fn fetch_detail(&self, category: Category, id: &str) -> Result<RawDetail> {
        match self.state().details.get(&(category, id.to_string())) {
            Some(detail) => Ok(detail.clone()),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }
}

//! Reconciliation of upstream media collections into per-user snapshots.
//!
//! The [`Reconciler`] walks every (category, status) collection of a user,
//! classifies and merges the records into a [`Snapshot`], materialises every
//! cover image through `shelf_images`, and persists the result with a
//! [`SnapshotStore`].

mod archive;
mod classify;
pub mod error;
mod models;
mod reconcile;
mod store;

pub use crate::archive::ArchivingSource;
pub use crate::classify::{Classifier, MarkerClassifier};
pub use shelf_upstream::DEFAULT_TV_MARKER;
pub use crate::models::{Detail, Item, Items, Kind, Snapshot, Stats, StatusCounts};
pub use crate::reconcile::Reconciler;
pub use crate::store::SnapshotStore;
pub use shelf_images::ImageRef;

//! Upstream media collection API.
//!
//! The upstream service exposes a user's marked movies and books as
//! paginated collections, one per (category, status) pair. This crate holds
//! the wire models, the [`CollectionSource`] seam with its HTTP
//! implementation, and [`walk`], which pages through one collection to
//! exhaustion.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod models;
mod source;
mod walk;

#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockSource;
pub use crate::models::{Category, DEFAULT_TV_MARKER, Page, PageRequest, RawDetail, RawRecord, Status};
pub use crate::source::{CollectionSource, HttpOptions, HttpSource};
pub use crate::walk::{DEFAULT_PAGE_SIZE, walk};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn CollectionSource + Send + Sync>;

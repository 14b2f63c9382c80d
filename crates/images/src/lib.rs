//! Content-addressed cover image cache.
//!
//! [`ImageCache`] maps a remote image URL to a stable local reference,
//! downloading on first use and healing zero-length or missing entries on
//! demand. [`BatchFetcher`] applies it to many references at once with
//! bounded parallelism. Bytes live on a `shelf_storage` backend; downloads go
//! through an [`ImageSource`].

mod batch;
mod cache;
pub mod error;
mod key;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod source;

pub use crate::batch::{BatchFetcher, BatchOptions, Mode};
pub use crate::cache::{CacheEntry, CacheStats, DEFAULT_PREFIX, ImageCache, ImageRef, ImageSourceHandle, LocalRef};
pub use crate::key::{CacheKey, DEFAULT_EXTENSION, EXTENSIONS, key_of, parse_source};
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockImageSource;
pub use crate::source::{HttpImageOptions, HttpImageSource, ImageSource};

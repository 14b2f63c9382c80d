//! Blob storage for shelf.
//!
//! Everything shelf persists (cached cover images, reconciled snapshots, raw
//! upstream pages) goes through a [`StorageBackend`]: a small get/put/delete
//! interface over opaque relative paths. Backends are created once at process
//! start and passed around as a [`BackendHandle`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{validate as validate_path, validate_segment};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

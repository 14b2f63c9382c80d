//! Cache key derivation.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use reqwest::Url;
use std::path::PathBuf;

/// File extensions kept from the source URL; anything else is stored as
/// [`DEFAULT_EXTENSION`].
pub const EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Storage key of one cached image: `<blake3 hex of the URL>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct CacheKey(String);

impl CacheKey {
    /// Accept an existing key, e.g. one parsed back out of a local reference.
    ///
    /// Only the shape is checked (hex stem, allowlisted extension); whether
    /// an entry exists is a question for the cache.
    pub fn parse(key: &str) -> Option<Self> {
        let (stem, ext) = key.rsplit_once('.')?;
        let shaped = stem.len() == blake3::OUT_LEN * 2
            && stem.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
            && EXTENSIONS.contains(&ext);
        shaped.then(|| Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension without the leading dot.
    pub fn extension(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, ext)| ext).unwrap_or(DEFAULT_EXTENSION)
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

/// Parse a source URL, rejecting anything that is not absolute http(s).
pub fn parse_source(url: &str) -> Result<Url> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed),
        _ => exn::bail!(ErrorKind::InvalidUrl(url.to_string())),
    }
}

/// Derive the cache key for a source URL.
///
/// Pure: the same URL always yields the same key. The extension comes from
/// the last path segment only, so query strings never leak into it.
///
/// ```
/// use shelf_images::{key_of, parse_source};
///
/// let url = parse_source("https://img.example/view/photo/m/public/p480747492.WEBP?x=1").unwrap();
/// let key = key_of(&url);
/// assert!(key.as_str().ends_with(".webp"));
/// assert_eq!(key, key_of(&url));
/// ```
pub fn key_of(url: &Url) -> CacheKey {
    let hash = blake3::hash(url.as_str().as_bytes());
    CacheKey(format!("{}.{}", hash.to_hex(), extension_of(url)))
}

fn extension_of(url: &Url) -> &'static str {
    let last = url.path_segments().and_then(|mut segments| segments.next_back()).unwrap_or_default();
    let ext = match last.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_EXTENSION,
    };
    EXTENSIONS.iter().find(|allowed| **allowed == ext).copied().unwrap_or(DEFAULT_EXTENSION)
}

//! Path validation.
//!
//! Every key handed to a backend is a relative path below the backend root.
//! Keys are built from upstream-controlled strings (user ids, URLs hashed into
//! cache keys), so they are normalised and checked here before any I/O.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalises a storage path.
///
/// `.` components, repeated and trailing separators are dropped; `..` is
/// resolved lexically and rejected if it would leave the storage root. Null
/// bytes, platform prefixes and paths that normalise to nothing are
/// rejected with [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
///
/// assert!(validate_path("snapshots/ahbei.json").is_ok());
/// assert!(validate_path("pages/ahbei/../ahbei/movie_done_0.json").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("pages//./ahbei/movie_done_0.json/").unwrap(),
///     Path::new("pages/ahbei/movie_done_0.json")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in the underlying syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a string that must be used as exactly one path component, such
/// as a user id or a cache key. Separators and dot-only names are rejected
/// outright instead of being normalised away.
///
/// ```
/// use shelf_storage::validate_segment;
///
/// assert!(validate_segment("ahbei").is_ok());
/// assert!(validate_segment("4f2c.jpg").is_ok());
/// assert!(validate_segment("a/b").is_err());
/// assert!(validate_segment("..").is_err());
/// ```
pub fn validate_segment(segment: &str) -> Result<&str> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(segment)));
    }
    Ok(segment)
}

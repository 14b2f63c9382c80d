//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Image failures never show up here:
//! they degrade to remote URLs inside the batch layer.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a reconciliation failure.
///
/// ### Dependency Errors
/// - [`ErrorKind::Upstream`]: the collection API failed mid-walk; nothing
///   was persisted.
/// - [`ErrorKind::Persistence`]: a snapshot or page archive could not be
///   read, written or decoded.
///
/// ### Input Errors
/// - [`ErrorKind::InvalidUser`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("upstream collection request failed")]
    Upstream,
    #[display("snapshot persistence failed")]
    Persistence,
    #[display("invalid user id: {_0:?}")]
    InvalidUser(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream)
    }
}

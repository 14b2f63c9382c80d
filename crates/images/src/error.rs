//! Image Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An image cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for image cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Everything except [`InvalidUrl`](Self::InvalidUrl) is recoverable: the
/// batch layer degrades the affected reference to its remote URL instead of
/// failing the caller.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Fetching or storing the image for this URL failed.
    #[display("failed to cache image {_0}")]
    Download(#[error(not(source))] String),
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[display("image transport failure")]
    Transport,
    /// The image host answered with a non-success status code.
    #[display("image host responded with HTTP {_0}")]
    HttpStatus(#[error(not(source))] u16),
    /// The image host answered with no bytes.
    #[display("image host returned an empty body")]
    EmptyBody,
    /// A cache entry exists but is unusable (zero length).
    #[display("corrupt cache entry: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// The underlying blob store failed.
    #[display("image storage failure")]
    Storage,
    /// The source URL is not an absolute http(s) URL.
    #[display("invalid image URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// HTTP client options were rejected.
    #[display("invalid image client configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Download(_) | Self::Transport | Self::EmptyBody | Self::Storage => true,
            Self::HttpStatus(code) => *code == 429 || *code >= 500,
            Self::Corrupt(_) | Self::InvalidUrl(_) | Self::InvalidConfig(_) => false,
        }
    }
}

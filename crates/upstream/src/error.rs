//! Upstream Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An upstream error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[display("upstream transport failure")]
    Transport,
    /// The upstream answered with a non-success status code.
    #[display("upstream responded with HTTP {_0}")]
    Status(#[error(not(source))] u16),
    /// The response body was not the expected JSON shape.
    #[display("upstream response could not be decoded")]
    Decode,
    /// A request URL could not be built from the configured base URL.
    #[display("invalid upstream URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// Client options (headers, base URL) were rejected.
    #[display("invalid upstream client configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    /// A category or status string was not recognised.
    #[display("unknown {field}: {value}")]
    Unknown {
        /// Which kind of value failed to parse.
        field: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// This crate never retries on its own; retry policy belongs to whoever
    /// drives it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

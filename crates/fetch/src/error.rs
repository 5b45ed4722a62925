//! Fetch error types.

use thiserror::Error;

/// Upstream fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL targets a disallowed scheme or host. No request was made.
    #[error("unsafe URL: {0}")]
    UnsafeUrl(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether the request was refused before any network activity.
    pub fn is_unsafe(&self) -> bool {
        matches!(self, Self::UnsafeUrl(_) | Self::InvalidUrl(_))
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

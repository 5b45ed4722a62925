//! Fetcher trait definition.

use crate::error::FetchResult;
use async_trait::async_trait;

/// Retrieves upstream subscription content.
///
/// Implementations must refuse unsafe URLs before any network activity and
/// bound both time and response size.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return the body as text.
    async fn fetch(&self, url: &str) -> FetchResult<String>;
}

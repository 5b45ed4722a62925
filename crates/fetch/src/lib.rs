//! Upstream subscription fetching for subhub.
//!
//! This crate provides:
//! - The [`Fetcher`] abstraction consumed by the subscription resolver
//! - An SSRF guard for upstream URLs
//! - An HTTP backend with timeout, byte cap and HTML-interstitial retry

pub mod backends;
pub mod error;
pub mod guard;
pub mod sniff;
pub mod traits;

pub use backends::http::HttpFetcher;
pub use error::{FetchError, FetchResult};
pub use traits::Fetcher;

use std::sync::Arc;
use subhub_core::config::FetchConfig;

/// Create a fetcher from configuration.
pub fn from_config(config: &FetchConfig) -> FetchResult<Arc<dyn Fetcher>> {
    let fetcher = HttpFetcher::new(config.clone())?;
    Ok(Arc::new(fetcher))
}

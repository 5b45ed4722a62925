//! Application state shared across handlers.

use crate::invalidation::CacheInvalidator;
use crate::resolver::SubscriptionResolver;
use std::sync::Arc;
use subhub_core::config::AppConfig;
use subhub_fetch::Fetcher;
use subhub_metadata::MetadataStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upstream fetcher, also used by the admin test-fetch endpoint.
    pub fetcher: Arc<dyn Fetcher>,
    pub resolver: Arc<SubscriptionResolver>,
    pub invalidator: CacheInvalidator,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let resolver = Arc::new(SubscriptionResolver::new(
            metadata.clone(),
            fetcher.clone(),
            config.subscription.clone(),
        ));
        let invalidator = CacheInvalidator::new(metadata.clone());

        Self {
            config: Arc::new(config),
            metadata,
            fetcher,
            resolver,
            invalidator,
        }
    }
}

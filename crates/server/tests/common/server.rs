//! Server test utilities.

use super::fixtures::MockFetcher;
use std::sync::Arc;
use subhub_core::config::{AdminConfig, AppConfig, MetadataConfig, SubscriptionConfig};
use subhub_fetch::Fetcher;
use subhub_metadata::{MetadataStore, SqliteStore};
use subhub_server::bootstrap::ensure_admin_token;
use subhub_server::{AppState, create_router};
use tempfile::TempDir;

/// Secret whose hash is `AdminConfig::for_testing().token_hash`.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub fetcher: Arc<MockFetcher>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with a temporary database and a scripted fetcher.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        // Keep unknown-token delays short so error-path tests stay fast
        let mut config = AppConfig {
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            admin: AdminConfig::for_testing(),
            subscription: SubscriptionConfig {
                not_found_delay_min_ms: 1,
                not_found_delay_max_ms: 5,
                ..Default::default()
            },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin token");

        let fetcher = Arc::new(MockFetcher::new());
        let state = AppState::new(config, metadata, fetcher.clone() as Arc<dyn Fetcher>);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            fetcher,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }
}

//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// Restrict it to scraper addresses at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Enable request tracing.
    #[serde(default)]
    pub enable_tracing: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            enable_tracing: false,
        }
    }
}

/// Admin token configuration.
///
/// The admin token is required for server operation. If the token hash
/// changes between restarts, the previous admin token is revoked and a new
/// one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

impl AdminConfig {
    /// **For testing only.** The hash belongs to the secret `test-admin-token`.
    pub fn for_testing() -> Self {
        Self {
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path, or `:memory:`.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/subhub.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Upstream fetch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
    /// User-Agent used for the single retry after an HTML response.
    #[serde(default = "default_retry_user_agent")]
    pub retry_user_agent: String,
    /// Accept header sent with every fetch.
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Skip the loopback/private-host guard.
    /// Only meant for tests that fetch from a local mock server.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_retry_user_agent() -> String {
    "curl/8.0.1".to_string()
}

fn default_accept() -> String {
    "text/plain,*/*;q=0.9".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_fetch_max_bytes(),
            retry_user_agent: default_retry_user_agent(),
            accept: default_accept(),
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// Validate fetch limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("fetch.timeout_ms must be greater than 0".to_string());
        }
        if self.max_bytes == 0 {
            return Err("fetch.max_bytes must be greater than 0".to_string());
        }
        if self.retry_user_agent.trim().is_empty() {
            return Err("fetch.retry_user_agent cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Subscription resolution configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Lifetime of a cached rendering in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Lower bound of the random delay before answering an unknown token.
    #[serde(default = "default_not_found_delay_min_ms")]
    pub not_found_delay_min_ms: u64,
    /// Upper bound of the random delay before answering an unknown token.
    #[serde(default = "default_not_found_delay_max_ms")]
    pub not_found_delay_max_ms: u64,
    /// Cap on nodes listed in previews (0 = unlimited).
    #[serde(default)]
    pub preview_nodes_limit: usize,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_not_found_delay_min_ms() -> u64 {
    100
}

fn default_not_found_delay_max_ms() -> u64 {
    200
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            not_found_delay_min_ms: default_not_found_delay_min_ms(),
            not_found_delay_max_ms: default_not_found_delay_max_ms(),
            preview_nodes_limit: 0,
        }
    }
}

impl SubscriptionConfig {
    /// Cache TTL as a `time::Duration`, saturating on overflow.
    pub fn cache_ttl(&self) -> time::Duration {
        let secs = i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    /// Validate TTL and delay bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_secs == 0 {
            return Err("subscription.cache_ttl_secs must be greater than 0".to_string());
        }
        if self.cache_ttl_secs > i64::MAX as u64 {
            return Err(format!(
                "subscription.cache_ttl_secs {} exceeds maximum value {}",
                self.cache_ttl_secs,
                i64::MAX
            ));
        }
        if self.not_found_delay_min_ms > self.not_found_delay_max_ms {
            return Err(format!(
                "subscription.not_found_delay_min_ms ({}) exceeds not_found_delay_max_ms ({})",
                self.not_found_delay_min_ms, self.not_found_delay_max_ms
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

impl AppConfig {
    /// **For testing only.** SQLite metadata at the default path and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            fetch: FetchConfig::default(),
            subscription: SubscriptionConfig::default(),
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| format!("server.bind '{}' is invalid: {e}", self.server.bind))?;
        crate::token::normalize_token_hash(&self.admin.token_hash)
            .map_err(|e| format!("admin.token_hash: {e}"))?;
        self.fetch.validate()?;
        self.subscription.validate()?;
        Ok(())
    }
}

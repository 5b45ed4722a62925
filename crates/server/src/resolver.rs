//! Subscription resolution: cache lookup, upstream fan-out, merge, encode.

use crate::error::ApiError;
use crate::metrics;
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use subhub_core::config::SubscriptionConfig;
use subhub_core::node::{deduplicate_nodes, extract_nodes};
use subhub_core::scope::source_label;
use subhub_core::token::hash_token;
use subhub_core::{NodeCandidate, RenderedSubscription, SourceScope};
use subhub_fetch::Fetcher;
use subhub_metadata::models::{
    CacheEntryRow, StaticNodeRow, UpstreamFetchStatus, UpstreamRow, UserRow,
};
use subhub_metadata::{MetadataError, MetadataStore};
use time::OffsetDateTime;
use uuid::Uuid;

/// Failures that abort a whole resolve or preview request.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("user not found")]
    UserNotFound,

    #[error("user inactive")]
    UserInactive,

    #[error("token revoked")]
    TokenRevoked,

    #[error("token not found")]
    TokenNotFound,

    #[error("invalid source record: {0}")]
    InvalidSource(#[from] subhub_core::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl ResolveError {
    /// Short label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::UserNotFound => "user_not_found",
            Self::UserInactive => "user_inactive",
            Self::TokenRevoked => "token_revoked",
            Self::TokenNotFound => "token_not_found",
            Self::InvalidSource(_) | Self::Metadata(_) => "error",
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UserNotFound => ApiError::UserNotFound,
            ResolveError::UserInactive => ApiError::UserInactive,
            ResolveError::TokenRevoked => ApiError::TokenRevoked,
            ResolveError::TokenNotFound => ApiError::TokenNotFound,
            ResolveError::InvalidSource(e) => ApiError::Internal(e.to_string()),
            ResolveError::Metadata(e) => ApiError::Metadata(e),
        }
    }
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Fetch outcome shown in previews.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpstreamState {
    Ok,
    Error,
}

/// Per-upstream diagnostic line.
#[derive(Clone, Debug, Serialize)]
pub struct UpstreamStatusEntry {
    pub source: String,
    pub status: UpstreamState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PreviewStats {
    pub upstreams: usize,
    pub static_nodes: usize,
    pub total_raw_nodes: usize,
    pub unique_nodes: usize,
}

/// Dry-run result: what the user would receive, without side effects.
#[derive(Clone, Debug, Serialize)]
pub struct PreviewReport {
    pub stats: PreviewStats,
    pub nodes: Vec<String>,
    pub upstream_status: Vec<UpstreamStatusEntry>,
}

/// Everything a user can see, in USER, TAG, GLOBAL order.
struct UserSources {
    upstreams: Vec<UpstreamRow>,
    static_nodes: Vec<StaticNodeRow>,
}

struct UpstreamFetchResult {
    priority: i32,
    source: String,
    outcome: Result<String, String>,
}

impl UpstreamFetchResult {
    fn status_entry(&self) -> UpstreamStatusEntry {
        match &self.outcome {
            Ok(_) => UpstreamStatusEntry {
                source: self.source.clone(),
                status: UpstreamState::Ok,
                error: None,
            },
            Err(message) => UpstreamStatusEntry {
                source: self.source.clone(),
                status: UpstreamState::Error,
                error: Some(message.clone()),
            },
        }
    }
}

/// Builds and caches per-user subscriptions.
pub struct SubscriptionResolver {
    metadata: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn Fetcher>,
    config: SubscriptionConfig,
}

impl SubscriptionResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn Fetcher>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            metadata,
            fetcher,
            config,
        }
    }

    /// Resolve the subscription addressed by a token secret.
    ///
    /// Unknown tokens fail only after a random delay so lookups cannot be
    /// timed. Revoked and expired tokens fail with `TokenRevoked`; a missing
    /// or deactivated owner fails with `UserInactive`.
    pub async fn resolve_by_token(&self, secret: &str) -> ResolveResult<RenderedSubscription> {
        let token_hash = hash_token(secret);
        let token = self.metadata.get_token_by_hash(&token_hash).await?;

        let (token, user_id) = match token {
            Some(token) => match token.user_id {
                Some(user_id) => (token, user_id),
                None => {
                    self.not_found_delay().await;
                    return Err(ResolveError::TokenNotFound);
                }
            },
            None => {
                self.not_found_delay().await;
                return Err(ResolveError::TokenNotFound);
            }
        };

        let now = OffsetDateTime::now_utc();
        if token.revoked_at.is_some() || token.is_expired_at(now) {
            return Err(ResolveError::TokenRevoked);
        }

        let user = self.metadata.get_user(user_id).await?;
        let user = match user {
            Some(user) if user.is_active => user,
            _ => return Err(ResolveError::UserInactive),
        };

        let (rendered, cache_hit) = self.resolve_active(&user).await?;

        if !cache_hit
            && let Err(e) = self
                .metadata
                .touch_token(token.token_id, OffsetDateTime::now_utc())
                .await
        {
            tracing::warn!(token_id = %token.token_id, error = %e, "failed to touch token");
        }

        Ok(rendered)
    }

    /// Resolve a user's subscription, serving a live cache entry when present.
    pub async fn resolve_for_user(&self, user_id: Uuid) -> ResolveResult<RenderedSubscription> {
        let user = self
            .metadata
            .get_user(user_id)
            .await?
            .ok_or(ResolveError::UserNotFound)?;
        if !user.is_active {
            return Err(ResolveError::UserInactive);
        }
        let (rendered, _) = self.resolve_active(&user).await?;
        Ok(rendered)
    }

    /// Build what the user would receive without reading or writing the
    /// cache and without recording upstream fetch status.
    pub async fn preview_for_user(&self, user_id: Uuid) -> ResolveResult<PreviewReport> {
        let user = self
            .metadata
            .get_user(user_id)
            .await?
            .ok_or(ResolveError::UserNotFound)?;

        let sources = self.list_sources(&user).await?;
        let fetched = self.fetch_upstreams(&sources.upstreams, false).await?;
        let candidates = build_candidates(&sources.static_nodes, &fetched)?;
        let total_raw_nodes = candidates.len();
        let mut nodes = deduplicate_nodes(candidates);

        let stats = PreviewStats {
            upstreams: fetched.len(),
            static_nodes: sources.static_nodes.len(),
            total_raw_nodes,
            unique_nodes: nodes.len(),
        };
        if self.config.preview_nodes_limit > 0 {
            nodes.truncate(self.config.preview_nodes_limit);
        }

        Ok(PreviewReport {
            stats,
            nodes,
            upstream_status: fetched.iter().map(UpstreamFetchResult::status_entry).collect(),
        })
    }

    /// Returns the rendering and whether it came from the cache.
    async fn resolve_active(&self, user: &UserRow) -> ResolveResult<(RenderedSubscription, bool)> {
        let now = OffsetDateTime::now_utc();
        if let Some(entry) = self.metadata.get_live_cache_entry(user.user_id, now).await? {
            metrics::CACHE_HITS.inc();
            tracing::debug!(user_id = %user.user_id, "subscription cache hit");
            return Ok((
                RenderedSubscription {
                    etag: entry.etag,
                    content_base64: entry.content_base64,
                },
                true,
            ));
        }
        metrics::CACHE_MISSES.inc();

        let sources = self.list_sources(user).await?;
        let fetched = self.fetch_upstreams(&sources.upstreams, true).await?;
        let candidates = build_candidates(&sources.static_nodes, &fetched)?;
        let nodes = deduplicate_nodes(candidates);
        metrics::NODES_EMITTED.inc_by(nodes.len() as u64);

        let rendered_at = OffsetDateTime::now_utc();
        let rendered = RenderedSubscription::render(&nodes, rendered_at);
        let entry = CacheEntryRow {
            user_id: user.user_id,
            content_base64: rendered.content_base64.clone(),
            etag: rendered.etag.clone(),
            expires_at: rendered_at + self.config.cache_ttl(),
            created_at: rendered_at,
        };
        self.metadata.put_cache_entry(&entry).await?;

        tracing::info!(
            user_id = %user.user_id,
            upstreams = fetched.len(),
            nodes = nodes.len(),
            "subscription rebuilt"
        );
        Ok((rendered, false))
    }

    async fn list_sources(&self, user: &UserRow) -> ResolveResult<UserSources> {
        let upstreams = self.metadata.list_upstreams_for_user(user.user_id).await?;
        let static_nodes = self.metadata.list_static_nodes_for_user(user.user_id).await?;
        Ok(UserSources {
            upstreams,
            static_nodes,
        })
    }

    /// Fetch all upstreams concurrently. Results keep the input order.
    async fn fetch_upstreams(
        &self,
        upstreams: &[UpstreamRow],
        record_status: bool,
    ) -> ResolveResult<Vec<UpstreamFetchResult>> {
        let mut labelled = Vec::with_capacity(upstreams.len());
        for upstream in upstreams {
            let scope = upstream.source_scope()?;
            labelled.push((upstream, scope));
        }

        let results = join_all(
            labelled
                .into_iter()
                .map(|(upstream, scope)| self.fetch_upstream(upstream, scope, record_status)),
        )
        .await;
        Ok(results)
    }

    async fn fetch_upstream(
        &self,
        upstream: &UpstreamRow,
        scope: SourceScope,
        record_status: bool,
    ) -> UpstreamFetchResult {
        let source = source_label(scope.upstream_label(), Some(&upstream.name));
        let timer = metrics::UPSTREAM_FETCH_DURATION.start_timer();
        let outcome = self.fetcher.fetch(&upstream.url).await;
        timer.observe_duration();

        let fetched_at = OffsetDateTime::now_utc();
        let (outcome, status) = match outcome {
            Ok(body) => {
                metrics::UPSTREAM_FETCHES.with_label_values(&["ok"]).inc();
                (Ok(body), UpstreamFetchStatus::ok(fetched_at))
            }
            Err(e) => {
                metrics::UPSTREAM_FETCHES.with_label_values(&["error"]).inc();
                tracing::warn!(
                    upstream_id = %upstream.upstream_id,
                    error = %e,
                    "upstream fetch failed"
                );
                let message = e.to_string();
                (Err(message.clone()), UpstreamFetchStatus::failed(fetched_at, message))
            }
        };

        if record_status
            && let Err(e) = self
                .metadata
                .update_upstream_fetch_status(upstream.upstream_id, &status)
                .await
        {
            tracing::warn!(
                upstream_id = %upstream.upstream_id,
                error = %e,
                "failed to record upstream fetch status"
            );
        }

        UpstreamFetchResult {
            priority: scope.priority(),
            source,
            outcome,
        }
    }

    async fn not_found_delay(&self) {
        let min = self.config.not_found_delay_min_ms;
        let max = self.config.not_found_delay_max_ms.max(min);
        let millis = rand::rng().random_range(min..=max);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Static nodes first, then successful upstreams, each in listing order.
fn build_candidates(
    static_nodes: &[StaticNodeRow],
    fetched: &[UpstreamFetchResult],
) -> ResolveResult<Vec<NodeCandidate>> {
    let mut candidates = Vec::new();

    for node in static_nodes {
        let scope = node.source_scope()?;
        let source = source_label(scope.static_label(), Some(&node.name));
        for uri in extract_nodes(&node.content) {
            candidates.push(NodeCandidate::new(uri, scope.priority(), source.clone()));
        }
    }

    for result in fetched {
        if let Ok(body) = &result.outcome {
            for uri in extract_nodes(body) {
                candidates.push(NodeCandidate::new(uri, result.priority, result.source.clone()));
            }
        }
    }

    Ok(candidates)
}

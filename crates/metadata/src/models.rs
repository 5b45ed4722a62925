//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use subhub_core::{SourceScope, SourceTarget};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Users and tags
// =============================================================================

/// Subscriber record.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    /// Unique display label.
    pub label: String,
    pub email: Option<String>,
    pub description: String,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Tag record. Users holding a tag see its TAG-scoped sources.
#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub tag_id: Uuid,
    pub name: String,
    /// Trimmed, lowercased name; unique.
    pub normalized_name: String,
    /// Default tags are attached to every newly created user.
    pub is_default: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Normalize a tag name for uniqueness checks.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Sources
// =============================================================================

/// Remote subscription source.
#[derive(Debug, Clone, FromRow)]
pub struct UpstreamRow {
    pub upstream_id: Uuid,
    pub name: String,
    pub url: String,
    /// "GLOBAL", "TAG" or "USER".
    pub scope: String,
    pub user_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub enabled: bool,
    /// Free-form provider type label.
    pub kind: Option<String>,
    /// HTTP-like status of the last fetch: 200 on success, 0 on failure.
    pub last_fetch_status: Option<i64>,
    pub last_fetch_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UpstreamRow {
    pub fn source_scope(&self) -> subhub_core::Result<SourceScope> {
        SourceScope::parse(&self.scope)
    }

    pub fn target(&self) -> subhub_core::Result<SourceTarget> {
        SourceTarget::new(self.source_scope()?, self.user_id, self.tag_id)
    }
}

/// Admin-entered node content (one URI, a list, or a base64 blob).
#[derive(Debug, Clone, FromRow)]
pub struct StaticNodeRow {
    pub static_node_id: Uuid,
    pub name: String,
    pub content: String,
    pub scope: String,
    pub user_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl StaticNodeRow {
    pub fn source_scope(&self) -> subhub_core::Result<SourceScope> {
        SourceScope::parse(&self.scope)
    }

    pub fn target(&self) -> subhub_core::Result<SourceTarget> {
        SourceTarget::new(self.source_scope()?, self.user_id, self.tag_id)
    }
}

/// Outcome of one upstream fetch, persisted onto the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFetchStatus {
    pub status: i64,
    pub fetched_at: OffsetDateTime,
    pub error: Option<String>,
}

impl UpstreamFetchStatus {
    pub fn ok(fetched_at: OffsetDateTime) -> Self {
        Self {
            status: 200,
            fetched_at,
            error: None,
        }
    }

    pub fn failed(fetched_at: OffsetDateTime, error: impl Into<String>) -> Self {
        Self {
            status: 0,
            fetched_at,
            error: Some(error.into()),
        }
    }
}

/// Listing filter for upstreams and static nodes. `None` fields match all.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub scope: Option<SourceScope>,
    pub user_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
}

// =============================================================================
// Tokens
// =============================================================================

/// Token record. Subscription tokens carry a `user_id`; admin tokens do not.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: Option<Uuid>,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

impl TokenRow {
    /// Whether the token is expired at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

// =============================================================================
// Subscription cache
// =============================================================================

/// Cached rendering of one user's subscription.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    pub user_id: Uuid,
    pub content_base64: String,
    pub etag: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl CacheEntryRow {
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

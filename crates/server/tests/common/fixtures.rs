//! Test fixtures: a scripted fetcher, node URIs and metadata rows.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::sync::Mutex;
use subhub_core::SourceScope;
use subhub_core::token::{TokenScope, hash_token, scopes_to_json};
use subhub_fetch::{FetchError, FetchResult, Fetcher};
use subhub_metadata::MetadataStore;
use subhub_metadata::models::{
    StaticNodeRow, TagRow, TokenRow, UpstreamRow, UserRow, normalize_tag_name,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Canned reply for one URL.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub enum MockReply {
    Body(String),
    Status(u16),
    Timeout,
    Unsafe,
}

/// Fetcher that answers from a URL table and counts calls per URL.
/// Unknown URLs fail with a network error.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<HashMap<String, usize>>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, reply: MockReply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn set_body(&self, url: &str, body: impl Into<String>) {
        self.set(url, MockReply::Body(body.into()));
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(MockReply::Body(body)) => Ok(body),
            Some(MockReply::Status(code)) => Err(FetchError::Status(code)),
            Some(MockReply::Timeout) => Err(FetchError::Timeout(10_000)),
            Some(MockReply::Unsafe) => Err(FetchError::UnsafeUrl(format!(
                "host is not allowed: {url}"
            ))),
            None => Err(FetchError::Network(format!("no route to {url}"))),
        }
    }
}

// =============================================================================
// Node URIs
// =============================================================================

/// A vmess link for `host:port` with display name `ps`.
#[allow(dead_code)]
pub fn vmess_uri(ps: &str, host: &str, port: u16) -> String {
    let json = format!(
        r#"{{"v":"2","ps":"{ps}","add":"{host}","port":{port},"id":"7d1bb8f6-0a44-4a36-9c5f-4ef1c3f7d001","net":"ws","path":"/ray"}}"#
    );
    format!("vmess://{}", STANDARD.encode(json))
}

#[allow(dead_code)]
pub fn trojan_uri(name: &str, host: &str) -> String {
    format!("trojan://secret@{host}:443?sni={host}#{name}")
}

/// Usage marker node that providers put at the top of their lists.
#[allow(dead_code)]
pub fn marker_uri(name: &str) -> String {
    format!("trojan://info@1.1.1.1:443?sni=fake_ip_for_sub_link#{name}")
}

/// Encode a node list the way providers serve it.
#[allow(dead_code)]
pub fn base64_list(uris: &[String]) -> String {
    STANDARD.encode(uris.join("\n"))
}

// =============================================================================
// Metadata rows
// =============================================================================

#[allow(dead_code)]
pub async fn insert_user(metadata: &dyn MetadataStore, label: &str) -> UserRow {
    let now = OffsetDateTime::now_utc();
    let user = UserRow {
        user_id: Uuid::new_v4(),
        label: label.to_string(),
        email: None,
        description: String::new(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    metadata
        .create_user(&user)
        .await
        .expect("Failed to create user");
    user
}

#[allow(dead_code)]
pub async fn insert_tag(metadata: &dyn MetadataStore, name: &str, is_default: bool) -> TagRow {
    let now = OffsetDateTime::now_utc();
    let tag = TagRow {
        tag_id: Uuid::new_v4(),
        name: name.to_string(),
        normalized_name: normalize_tag_name(name),
        is_default,
        created_at: now,
        updated_at: now,
    };
    metadata.create_tag(&tag).await.expect("Failed to create tag");
    tag
}

/// Build an upstream row; the target id is taken from `target` for USER and
/// TAG scopes.
#[allow(dead_code)]
pub fn upstream_row(name: &str, url: &str, scope: SourceScope, target: Option<Uuid>) -> UpstreamRow {
    let now = OffsetDateTime::now_utc();
    UpstreamRow {
        upstream_id: Uuid::new_v4(),
        name: name.to_string(),
        url: url.to_string(),
        scope: scope.as_str().to_string(),
        user_id: if scope == SourceScope::User { target } else { None },
        tag_id: if scope == SourceScope::Tag { target } else { None },
        enabled: true,
        kind: None,
        last_fetch_status: None,
        last_fetch_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub async fn insert_upstream(
    metadata: &dyn MetadataStore,
    name: &str,
    url: &str,
    scope: SourceScope,
    target: Option<Uuid>,
) -> UpstreamRow {
    let row = upstream_row(name, url, scope, target);
    metadata
        .create_upstream(&row)
        .await
        .expect("Failed to create upstream");
    row
}

#[allow(dead_code)]
pub fn static_node_row(
    name: &str,
    content: &str,
    scope: SourceScope,
    target: Option<Uuid>,
) -> StaticNodeRow {
    let now = OffsetDateTime::now_utc();
    StaticNodeRow {
        static_node_id: Uuid::new_v4(),
        name: name.to_string(),
        content: content.to_string(),
        scope: scope.as_str().to_string(),
        user_id: if scope == SourceScope::User { target } else { None },
        tag_id: if scope == SourceScope::Tag { target } else { None },
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub async fn insert_static_node(
    metadata: &dyn MetadataStore,
    name: &str,
    content: &str,
    scope: SourceScope,
    target: Option<Uuid>,
) -> StaticNodeRow {
    let row = static_node_row(name, content, scope, target);
    metadata
        .create_static_node(&row)
        .await
        .expect("Failed to create static node");
    row
}

/// Create a subscription token for `user_id` and return its secret.
#[allow(dead_code)]
pub async fn insert_subscription_token(metadata: &dyn MetadataStore, user_id: Uuid) -> String {
    let secret = format!("sub-{}", Uuid::new_v4().simple());
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: Some(user_id),
        token_hash: hash_token(&secret),
        scopes: scopes_to_json(&[TokenScope::SubscriptionRead]),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    };
    metadata
        .create_token(&token)
        .await
        .expect("Failed to create token");
    secret
}

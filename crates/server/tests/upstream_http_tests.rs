//! Subscription delivery through the real HTTP fetcher against mock providers.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::*;
use httpmock::Method::GET;
use httpmock::MockServer;
use std::net::TcpListener;
use std::sync::Arc;
use subhub_core::SourceScope;
use subhub_core::config::{AppConfig, FetchConfig, MetadataConfig, SubscriptionConfig};
use subhub_server::bootstrap::ensure_admin_token;
use subhub_server::{AppState, create_router};
use tower::ServiceExt;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

async fn http_state(metadata: Arc<dyn subhub_metadata::MetadataStore>) -> AppState {
    let config = AppConfig {
        metadata: MetadataConfig::default(),
        fetch: FetchConfig {
            timeout_ms: 2_000,
            allow_private_hosts: true,
            ..FetchConfig::default()
        },
        subscription: SubscriptionConfig {
            not_found_delay_min_ms: 1,
            not_found_delay_max_ms: 5,
            ..SubscriptionConfig::default()
        },
        ..AppConfig::for_testing()
    };
    ensure_admin_token(metadata.as_ref(), &config.admin)
        .await
        .unwrap();
    let fetcher = subhub_fetch::from_config(&config.fetch).unwrap();
    AppState::new(config, metadata, fetcher)
}

async fn get_text(router: &axum::Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_subscription_from_live_providers() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let provider = MockServer::start_async().await;
    let broken = MockServer::start_async().await;

    let good_nodes = vec![
        marker_uri("Traffic: 10GB left"),
        trojan_uri("HK-01", "hk.example.net"),
        vmess_uri("JP-01", "jp.example.net", 443),
    ];
    let provider_mock = provider
        .mock_async(|when, then| {
            when.method(GET).path("/sub");
            then.status(200).body(base64_list(&good_nodes));
        })
        .await;
    broken
        .mock_async(|when, then| {
            when.method(GET).path("/sub");
            then.status(503).body("maintenance");
        })
        .await;

    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    let user = insert_user(store.as_ref(), "alice").await;
    let secret = insert_subscription_token(store.as_ref(), user.user_id).await;
    let good = insert_upstream(
        store.as_ref(),
        "provider",
        &provider.url("/sub"),
        SourceScope::Global,
        None,
    )
    .await;
    let bad = insert_upstream(
        store.as_ref(),
        "broken",
        &broken.url("/sub"),
        SourceScope::User,
        Some(user.user_id),
    )
    .await;

    let router = create_router(http_state(store.clone()).await);

    let (status, body) = get_text(&router, &format!("/subs/{secret}")).await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("trojan://info@"));
    assert!(lines.iter().any(|line| line.contains("hk.example.net")));
    provider_mock.assert_async().await;

    let (status, encoded) = get_text(&router, &format!("/subs/{secret}?format=base64")).await;
    assert_eq!(status, StatusCode::OK);
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).unwrap()).unwrap();
    assert_eq!(decoded.lines().count(), 3);

    let good_row = store.get_upstream(good.upstream_id).await.unwrap().unwrap();
    assert_eq!(good_row.last_fetch_status, Some(200));
    let bad_row = store.get_upstream(bad.upstream_id).await.unwrap().unwrap();
    assert_eq!(bad_row.last_fetch_status, Some(0));
    assert!(bad_row.last_error.is_some());
}

#[tokio::test]
async fn test_loopback_upstream_is_refused_by_default() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let provider = MockServer::start_async().await;
    let provider_mock = provider
        .mock_async(|when, then| {
            when.method(GET).path("/sub");
            then.status(200).body(trojan_uri("HK-01", "hk.example.net"));
        })
        .await;

    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    let user = insert_user(store.as_ref(), "alice").await;
    let secret = insert_subscription_token(store.as_ref(), user.user_id).await;
    let upstream = insert_upstream(
        store.as_ref(),
        "loopback",
        &provider.url("/sub"),
        SourceScope::Global,
        None,
    )
    .await;

    let config = AppConfig::for_testing();
    ensure_admin_token(store.as_ref(), &config.admin).await.unwrap();
    let fetcher = subhub_fetch::from_config(&config.fetch).unwrap();
    let router = create_router(AppState::new(config, store.clone(), fetcher));

    let (status, body) = get_text(&router, &format!("/subs/{secret}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.trim().is_empty());
    provider_mock.assert_hits_async(0).await;

    let row = store.get_upstream(upstream.upstream_id).await.unwrap().unwrap();
    assert_eq!(row.last_fetch_status, Some(0));
}

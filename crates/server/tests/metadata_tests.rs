//! Integration tests for the SQLite metadata store.

mod common;

use common::fixtures::{
    insert_static_node, insert_subscription_token, insert_tag, insert_upstream, insert_user,
};
use common::TestMetadata;
use subhub_core::SourceScope;
use subhub_core::token::hash_token;
use subhub_metadata::MetadataError;
use subhub_metadata::models::*;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn cache_entry(user_id: Uuid, content: &str, expires_at: OffsetDateTime) -> CacheEntryRow {
    CacheEntryRow {
        user_id,
        content_base64: content.to_string(),
        etag: format!("\"{}\"", &hash_token(content)[..16]),
        expires_at,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn test_user_lifecycle() {
    let metadata = TestMetadata::in_memory()
        .await
        .expect("Failed to create metadata");
    let store = metadata.store();

    let mut user = insert_user(store.as_ref(), "alice").await;

    let fetched = store.get_user(user.user_id).await.unwrap().unwrap();
    assert_eq!(fetched.label, "alice");
    assert!(fetched.is_active);

    let by_label = store.get_user_by_label("alice").await.unwrap().unwrap();
    assert_eq!(by_label.user_id, user.user_id);
    assert!(store.get_user_by_label("bob").await.unwrap().is_none());

    user.is_active = false;
    user.email = Some("alice@example.com".to_string());
    user.updated_at = OffsetDateTime::now_utc();
    store.update_user(&user).await.unwrap();

    let updated = store.get_user(user.user_id).await.unwrap().unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.email.as_deref(), Some("alice@example.com"));

    assert!(store.delete_user(user.user_id).await.unwrap());
    assert!(!store.delete_user(user.user_id).await.unwrap());
    assert!(store.get_user(user.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_user_label_is_unique() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    insert_user(store.as_ref(), "alice").await;

    let now = OffsetDateTime::now_utc();
    let duplicate = UserRow {
        user_id: Uuid::new_v4(),
        label: "alice".to_string(),
        email: None,
        description: String::new(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let err = store.create_user(&duplicate).await.unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)), "got {err:?}");
}

#[tokio::test]
async fn test_update_missing_user_is_not_found() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let now = OffsetDateTime::now_utc();
    let ghost = UserRow {
        user_id: Uuid::new_v4(),
        label: "ghost".to_string(),
        email: None,
        description: String::new(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let err = store.update_user(&ghost).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_tag_normalized_name_is_unique() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let tag = insert_tag(store.as_ref(), "Premium", false).await;
    assert_eq!(tag.normalized_name, "premium");

    let found = store
        .get_tag_by_normalized_name(&normalize_tag_name("  PREMIUM "))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.tag_id, tag.tag_id);

    let now = OffsetDateTime::now_utc();
    let clash = TagRow {
        tag_id: Uuid::new_v4(),
        name: "premium".to_string(),
        normalized_name: normalize_tag_name("premium"),
        is_default: false,
        created_at: now,
        updated_at: now,
    };
    let err = store.create_tag(&clash).await.unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)), "got {err:?}");
}

#[tokio::test]
async fn test_default_tags_and_memberships() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let basic = insert_tag(store.as_ref(), "basic", true).await;
    let premium = insert_tag(store.as_ref(), "premium", false).await;
    let trial = insert_tag(store.as_ref(), "trial", true).await;

    let defaults = store.list_default_tag_ids().await.unwrap();
    assert_eq!(defaults, vec![basic.tag_id, trial.tag_id]);

    let alice = insert_user(store.as_ref(), "alice").await;
    store
        .set_user_tags(alice.user_id, &[basic.tag_id, premium.tag_id])
        .await
        .unwrap();
    assert_eq!(
        store.list_user_tag_ids(alice.user_id).await.unwrap(),
        vec![basic.tag_id, premium.tag_id]
    );

    // Replacing drops memberships not in the new set.
    store
        .set_user_tags(alice.user_id, &[trial.tag_id])
        .await
        .unwrap();
    assert_eq!(
        store.list_user_tag_ids(alice.user_id).await.unwrap(),
        vec![trial.tag_id]
    );
}

#[tokio::test]
async fn test_set_user_tags_rejects_unknown_tag() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let keep = insert_tag(store.as_ref(), "keep", false).await;
    store.set_user_tags(alice.user_id, &[keep.tag_id]).await.unwrap();

    let err = store
        .set_user_tags(alice.user_id, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Constraint(_)), "got {err:?}");

    // The failed replacement rolled back.
    assert_eq!(
        store.list_user_tag_ids(alice.user_id).await.unwrap(),
        vec![keep.tag_id]
    );
}

#[tokio::test]
async fn test_add_tag_to_users_skips_existing_and_unknown() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let tag = insert_tag(store.as_ref(), "promo", false).await;
    let alice = insert_user(store.as_ref(), "alice").await;
    let bob = insert_user(store.as_ref(), "bob").await;
    store.set_user_tags(alice.user_id, &[tag.tag_id]).await.unwrap();

    let added = store
        .add_tag_to_users(tag.tag_id, &[alice.user_id, bob.user_id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(added, 1);

    let mut members = store.list_user_ids_by_tag(tag.tag_id).await.unwrap();
    members.sort();
    let mut expected = vec![alice.user_id, bob.user_id];
    expected.sort();
    assert_eq!(members, expected);
}

#[tokio::test]
async fn test_upstream_visibility_for_user() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let bob = insert_user(store.as_ref(), "bob").await;
    let vip = insert_tag(store.as_ref(), "vip", false).await;
    let other = insert_tag(store.as_ref(), "other", false).await;
    store.set_user_tags(alice.user_id, &[vip.tag_id]).await.unwrap();

    let global = insert_upstream(
        store.as_ref(),
        "global",
        "https://a.example/sub",
        SourceScope::Global,
        None,
    )
    .await;
    let tagged = insert_upstream(
        store.as_ref(),
        "vip",
        "https://b.example/sub",
        SourceScope::Tag,
        Some(vip.tag_id),
    )
    .await;
    insert_upstream(
        store.as_ref(),
        "other tag",
        "https://c.example/sub",
        SourceScope::Tag,
        Some(other.tag_id),
    )
    .await;
    let own = insert_upstream(
        store.as_ref(),
        "alice only",
        "https://d.example/sub",
        SourceScope::User,
        Some(alice.user_id),
    )
    .await;
    insert_upstream(
        store.as_ref(),
        "bob only",
        "https://e.example/sub",
        SourceScope::User,
        Some(bob.user_id),
    )
    .await;
    let mut disabled = insert_upstream(
        store.as_ref(),
        "disabled",
        "https://f.example/sub",
        SourceScope::Global,
        None,
    )
    .await;
    disabled.enabled = false;
    disabled.updated_at = OffsetDateTime::now_utc();
    store.update_upstream(&disabled).await.unwrap();

    // USER first, then TAG, then GLOBAL.
    let visible: Vec<Uuid> = store
        .list_upstreams_for_user(alice.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.upstream_id)
        .collect();
    assert_eq!(
        visible,
        vec![own.upstream_id, tagged.upstream_id, global.upstream_id]
    );

    let bob_visible = store.list_upstreams_for_user(bob.user_id).await.unwrap();
    assert_eq!(bob_visible.len(), 2);
    assert!(bob_visible.iter().all(|row| row.upstream_id != tagged.upstream_id));
}

#[tokio::test]
async fn test_upstream_scope_target_is_checked() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let mut row = common::fixtures::upstream_row(
        "bad",
        "https://a.example/sub",
        SourceScope::Global,
        None,
    );
    row.user_id = Some(Uuid::new_v4());
    let err = store.create_upstream(&row).await.unwrap_err();
    assert!(matches!(err, MetadataError::Constraint(_)), "got {err:?}");
}

#[tokio::test]
async fn test_upstream_listing_filters() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    insert_upstream(
        store.as_ref(),
        "global",
        "https://a.example/sub",
        SourceScope::Global,
        None,
    )
    .await;
    let own = insert_upstream(
        store.as_ref(),
        "own",
        "https://b.example/sub",
        SourceScope::User,
        Some(alice.user_id),
    )
    .await;

    assert_eq!(
        store
            .list_upstreams(&SourceFilter::default())
            .await
            .unwrap()
            .len(),
        2
    );

    let filter = SourceFilter {
        scope: Some(SourceScope::User),
        user_id: Some(alice.user_id),
        tag_id: None,
    };
    let rows = store.list_upstreams(&filter).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].upstream_id, own.upstream_id);
}

#[tokio::test]
async fn test_update_upstream_fetch_status() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let upstream = insert_upstream(
        store.as_ref(),
        "global",
        "https://a.example/sub",
        SourceScope::Global,
        None,
    )
    .await;

    let fetched_at = OffsetDateTime::now_utc();
    store
        .update_upstream_fetch_status(
            upstream.upstream_id,
            &UpstreamFetchStatus::failed(fetched_at, "HTTP 502"),
        )
        .await
        .unwrap();
    let row = store.get_upstream(upstream.upstream_id).await.unwrap().unwrap();
    assert_eq!(row.last_fetch_status, Some(0));
    assert_eq!(row.last_error.as_deref(), Some("HTTP 502"));
    assert!(row.last_fetch_at.is_some());

    store
        .update_upstream_fetch_status(upstream.upstream_id, &UpstreamFetchStatus::ok(fetched_at))
        .await
        .unwrap();
    let row = store.get_upstream(upstream.upstream_id).await.unwrap().unwrap();
    assert_eq!(row.last_fetch_status, Some(200));
    assert!(row.last_error.is_none());
}

#[tokio::test]
async fn test_static_nodes_for_user() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let global = insert_static_node(
        store.as_ref(),
        "global",
        "trojan://a@a.example:443#A",
        SourceScope::Global,
        None,
    )
    .await;
    let own = insert_static_node(
        store.as_ref(),
        "own",
        "trojan://b@b.example:443#B",
        SourceScope::User,
        Some(alice.user_id),
    )
    .await;

    let ids: Vec<Uuid> = store
        .list_static_nodes_for_user(alice.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.static_node_id)
        .collect();
    assert_eq!(ids, vec![own.static_node_id, global.static_node_id]);

    let mut edited = own.clone();
    edited.enabled = false;
    edited.content = "trojan://c@c.example:443#C".to_string();
    edited.updated_at = OffsetDateTime::now_utc();
    store.update_static_node(&edited).await.unwrap();

    let visible = store.list_static_nodes_for_user(alice.user_id).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].static_node_id, global.static_node_id);

    assert!(store.delete_static_node(own.static_node_id).await.unwrap());
    assert!(store.get_static_node(own.static_node_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deleting_user_cascades() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let tag = insert_tag(store.as_ref(), "vip", false).await;
    store.set_user_tags(alice.user_id, &[tag.tag_id]).await.unwrap();
    let upstream = insert_upstream(
        store.as_ref(),
        "own",
        "https://a.example/sub",
        SourceScope::User,
        Some(alice.user_id),
    )
    .await;
    let node = insert_static_node(
        store.as_ref(),
        "own",
        "trojan://a@a.example:443#A",
        SourceScope::User,
        Some(alice.user_id),
    )
    .await;
    let secret = insert_subscription_token(store.as_ref(), alice.user_id).await;
    let expires = OffsetDateTime::now_utc() + Duration::minutes(5);
    store
        .put_cache_entry(&cache_entry(alice.user_id, "bm9kZXM=", expires))
        .await
        .unwrap();

    assert!(store.delete_user(alice.user_id).await.unwrap());

    assert!(store.get_upstream(upstream.upstream_id).await.unwrap().is_none());
    assert!(store.get_static_node(node.static_node_id).await.unwrap().is_none());
    assert!(store.get_token_by_hash(&hash_token(&secret)).await.unwrap().is_none());
    assert!(store.list_user_ids_by_tag(tag.tag_id).await.unwrap().is_empty());
    assert!(
        store
            .get_live_cache_entry(alice.user_id, OffsetDateTime::now_utc())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_deleting_tag_cascades() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let tag = insert_tag(store.as_ref(), "vip", false).await;
    store.set_user_tags(alice.user_id, &[tag.tag_id]).await.unwrap();
    let upstream = insert_upstream(
        store.as_ref(),
        "vip",
        "https://a.example/sub",
        SourceScope::Tag,
        Some(tag.tag_id),
    )
    .await;

    assert!(store.delete_tag(tag.tag_id).await.unwrap());

    assert!(store.get_upstream(upstream.upstream_id).await.unwrap().is_none());
    assert!(store.list_user_tag_ids(alice.user_id).await.unwrap().is_empty());
    assert!(store.get_user(alice.user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_token_lifecycle() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let first = insert_subscription_token(store.as_ref(), alice.user_id).await;
    let second = insert_subscription_token(store.as_ref(), alice.user_id).await;

    let token = store
        .get_token_by_hash(&hash_token(&first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.user_id, Some(alice.user_id));
    assert!(token.last_used_at.is_none());

    let used_at = OffsetDateTime::now_utc();
    store.touch_token(token.token_id, used_at).await.unwrap();
    let touched = store.get_token(token.token_id).await.unwrap().unwrap();
    assert!(touched.last_used_at.is_some());

    let revoked_at = OffsetDateTime::now_utc();
    assert_eq!(
        store
            .revoke_user_tokens(alice.user_id, revoked_at)
            .await
            .unwrap(),
        2
    );
    // Already revoked tokens are not counted again.
    assert_eq!(
        store
            .revoke_user_tokens(alice.user_id, revoked_at)
            .await
            .unwrap(),
        0
    );

    let tokens = store.list_user_tokens(alice.user_id).await.unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().all(|t| t.revoked_at.is_some()));
    assert!(
        store
            .get_token_by_hash(&hash_token(&second))
            .await
            .unwrap()
            .unwrap()
            .revoked_at
            .is_some()
    );
}

#[tokio::test]
async fn test_token_hash_is_unique() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: None,
        token_hash: hash_token("same"),
        scopes: r#"["admin"]"#.to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    };
    store.create_token(&token).await.unwrap();

    let clash = TokenRow {
        token_id: Uuid::new_v4(),
        ..token
    };
    let err = store.create_token(&clash).await.unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)), "got {err:?}");
}

#[tokio::test]
async fn test_cache_entry_lifecycle() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let bob = insert_user(store.as_ref(), "bob").await;
    let now = OffsetDateTime::now_utc();

    store
        .put_cache_entry(&cache_entry(alice.user_id, "Zmlyc3Q=", now + Duration::minutes(5)))
        .await
        .unwrap();
    // Upsert replaces the previous rendering.
    store
        .put_cache_entry(&cache_entry(alice.user_id, "c2Vjb25k", now + Duration::minutes(5)))
        .await
        .unwrap();
    let live = store
        .get_live_cache_entry(alice.user_id, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.content_base64, "c2Vjb25k");

    // Entries past expiry are not served.
    assert!(
        store
            .get_live_cache_entry(alice.user_id, now + Duration::minutes(6))
            .await
            .unwrap()
            .is_none()
    );

    store
        .put_cache_entry(&cache_entry(bob.user_id, "Ym9i", now + Duration::minutes(5)))
        .await
        .unwrap();
    assert_eq!(
        store
            .delete_cache_entries_for_users(&[alice.user_id])
            .await
            .unwrap(),
        1
    );
    assert!(store.get_live_cache_entry(alice.user_id, now).await.unwrap().is_none());
    assert!(store.get_live_cache_entry(bob.user_id, now).await.unwrap().is_some());

    assert_eq!(store.delete_cache_entries_for_users(&[]).await.unwrap(), 0);
    assert_eq!(store.delete_all_cache_entries().await.unwrap(), 1);
}

#[tokio::test]
async fn test_purge_expired_cache_entries() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let alice = insert_user(store.as_ref(), "alice").await;
    let bob = insert_user(store.as_ref(), "bob").await;
    let now = OffsetDateTime::now_utc();

    store
        .put_cache_entry(&cache_entry(alice.user_id, "b2xk", now - Duration::seconds(1)))
        .await
        .unwrap();
    store
        .put_cache_entry(&cache_entry(bob.user_id, "bmV3", now + Duration::minutes(5)))
        .await
        .unwrap();

    assert_eq!(store.purge_expired_cache_entries(now).await.unwrap(), 1);
    assert!(store.get_live_cache_entry(bob.user_id, now).await.unwrap().is_some());
    assert_eq!(store.purge_expired_cache_entries(now).await.unwrap(), 0);
}

fn admin_row(secret: &str) -> TokenRow {
    TokenRow {
        token_id: Uuid::new_v4(),
        user_id: None,
        token_hash: hash_token(secret),
        scopes: r#"["admin"]"#.to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    }
}

#[tokio::test]
async fn test_admin_token_marker() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    assert!(store.admin_token_id().await.unwrap().is_none());

    let existing = admin_row("existing");
    store.create_token(&existing).await.unwrap();
    store.mark_admin_token(existing.token_id).await.unwrap();
    assert_eq!(store.admin_token_id().await.unwrap(), Some(existing.token_id));

    let other = admin_row("other");
    store.create_token(&other).await.unwrap();
    store.mark_admin_token(other.token_id).await.unwrap();
    assert_eq!(store.admin_token_id().await.unwrap(), Some(other.token_id));
}

#[tokio::test]
async fn test_rotate_admin_token_revokes_previous() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    let now = OffsetDateTime::now_utc();

    let first = admin_row("first");
    assert_eq!(store.rotate_admin_token(&first, now).await.unwrap(), None);
    assert_eq!(store.admin_token_id().await.unwrap(), Some(first.token_id));

    let second = admin_row("second");
    let replaced = store.rotate_admin_token(&second, now).await.unwrap();
    assert_eq!(replaced, Some(first.token_id));
    assert_eq!(store.admin_token_id().await.unwrap(), Some(second.token_id));

    let first_row = store.get_token(first.token_id).await.unwrap().unwrap();
    assert!(first_row.revoked_at.is_some());
    let second_row = store.get_token(second.token_id).await.unwrap().unwrap();
    assert!(second_row.revoked_at.is_none());
}

#[tokio::test]
async fn test_rotate_admin_token_rolls_back_on_hash_conflict() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    let now = OffsetDateTime::now_utc();

    let current = admin_row("current");
    store.rotate_admin_token(&current, now).await.unwrap();

    let duplicate = admin_row("current");
    let err = store.rotate_admin_token(&duplicate, now).await.unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)), "unexpected error: {err:?}");

    assert_eq!(store.admin_token_id().await.unwrap(), Some(current.token_id));
    let current_row = store.get_token(current.token_id).await.unwrap().unwrap();
    assert!(current_row.revoked_at.is_none());
}

#[tokio::test]
async fn test_health_check() {
    let metadata = TestMetadata::new().await.unwrap();
    metadata.store().health_check().await.unwrap();
}

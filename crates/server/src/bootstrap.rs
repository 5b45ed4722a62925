//! Admin token initialization.

use anyhow::{Result, bail};
use subhub_core::config::AdminConfig;
use subhub_core::token::{TokenScope, normalize_token_hash, scopes_to_json};
use subhub_metadata::MetadataStore;
use subhub_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin token exists, rotating the previous one if needed.
///
/// If the token hash changes between restarts, the previous admin token is
/// revoked and a new one is created with the new hash.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let hash = normalize_token_hash(&config.token_hash)
        .map_err(|e| anyhow::anyhow!("invalid admin token_hash: {e}"))?;

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); use a new token hash",
                existing.token_id
            );
        }
        if existing.user_id.is_some() {
            bail!("admin token hash collides with a subscription token; use a new token hash");
        }
        let now = OffsetDateTime::now_utc();
        if existing.is_expired_at(now) {
            bail!(
                "admin token hash matches an expired token (id={}); use a new token hash",
                existing.token_id
            );
        }
        metadata.mark_admin_token(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: None,
        token_hash: hash,
        scopes: scopes_to_json(&[TokenScope::Admin]),
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    if let Some(prev_id) = metadata.rotate_admin_token(&token, now).await? {
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }
    tracing::info!(token_id = %token.token_id, "Admin token created");

    Ok(())
}

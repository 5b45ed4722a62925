//! Marker for the admin token derived from `admin.token_hash`.
//!
//! Exactly one admin token is owned by configuration. The marker row records
//! which token that is so a changed hash revokes its predecessor on the next
//! start instead of leaving two live admin tokens behind.

use crate::error::MetadataResult;
use crate::models::TokenRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait AdminTokenRepo: Send + Sync {
    /// Id of the configured admin token, if one has been recorded.
    async fn admin_token_id(&self) -> MetadataResult<Option<Uuid>>;

    /// Point the marker at an already stored token.
    async fn mark_admin_token(&self, token_id: Uuid) -> MetadataResult<()>;

    /// Install `token` as the configured admin token in one transaction.
    ///
    /// The previously marked token, if still live, is revoked at `now`.
    /// Returns the id of the token it replaced.
    async fn rotate_admin_token(
        &self,
        token: &TokenRow,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Uuid>>;
}

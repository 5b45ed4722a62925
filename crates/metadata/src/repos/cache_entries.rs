//! Subscription cache repository.

use crate::error::MetadataResult;
use crate::models::CacheEntryRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-user cache of rendered subscriptions.
///
/// At most one entry exists per user. Expired entries read as absent.
#[async_trait]
pub trait CacheEntryRepo: Send + Sync {
    /// Get the user's entry if it has not expired at `now`.
    async fn get_live_cache_entry(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<CacheEntryRow>>;

    /// Insert or overwrite the user's entry (last writer wins).
    async fn put_cache_entry(&self, entry: &CacheEntryRow) -> MetadataResult<()>;

    /// Delete the entries of the given users.
    async fn delete_cache_entries_for_users(&self, user_ids: &[Uuid]) -> MetadataResult<u64>;

    async fn delete_all_cache_entries(&self) -> MetadataResult<u64>;

    /// Delete entries that expired at or before `now`.
    async fn purge_expired_cache_entries(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}

//! Subscription cache invalidation.

use std::collections::HashSet;
use std::sync::Arc;
use subhub_core::SourceScope;
use subhub_metadata::{MetadataResult, MetadataStore};
use uuid::Uuid;

/// Drops cached subscriptions whose inputs changed.
#[derive(Clone)]
pub struct CacheInvalidator {
    metadata: Arc<dyn MetadataStore>,
}

impl CacheInvalidator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Delete every cache entry.
    pub async fn invalidate_all(&self) -> MetadataResult<u64> {
        let removed = self.metadata.delete_all_cache_entries().await?;
        tracing::debug!(removed, "invalidated all cached subscriptions");
        Ok(removed)
    }

    /// Delete cache entries for the given users. Duplicates are ignored and
    /// an empty list does nothing.
    pub async fn invalidate_users(&self, user_ids: &[Uuid]) -> MetadataResult<u64> {
        let mut seen = HashSet::new();
        let unique: Vec<Uuid> = user_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if unique.is_empty() {
            return Ok(0);
        }
        let removed = self.metadata.delete_cache_entries_for_users(&unique).await?;
        tracing::debug!(users = unique.len(), removed, "invalidated cached subscriptions");
        Ok(removed)
    }

    /// Invalidate whatever a source with this scope and target feeds.
    ///
    /// GLOBAL clears everything, USER clears one user and TAG clears every
    /// current holder of the tag. A missing target id is a no-op.
    pub async fn invalidate_by_source_target(
        &self,
        scope: SourceScope,
        user_id: Option<Uuid>,
        tag_id: Option<Uuid>,
    ) -> MetadataResult<u64> {
        match (scope, user_id, tag_id) {
            (SourceScope::Global, _, _) => self.invalidate_all().await,
            (SourceScope::User, Some(user_id), _) => self.invalidate_users(&[user_id]).await,
            (SourceScope::Tag, _, Some(tag_id)) => {
                let user_ids = self.metadata.list_user_ids_by_tag(tag_id).await?;
                self.invalidate_users(&user_ids).await
            }
            _ => Ok(0),
        }
    }
}

//! Tag repository.

use crate::error::MetadataResult;
use crate::models::TagRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for tag operations.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Create a tag. Fails with `AlreadyExists` when the normalized name is taken.
    async fn create_tag(&self, tag: &TagRow) -> MetadataResult<()>;

    async fn get_tag(&self, tag_id: Uuid) -> MetadataResult<Option<TagRow>>;

    async fn get_tag_by_normalized_name(&self, normalized: &str) -> MetadataResult<Option<TagRow>>;

    /// List tags, newest first.
    async fn list_tags(&self) -> MetadataResult<Vec<TagRow>>;

    async fn update_tag(&self, tag: &TagRow) -> MetadataResult<()>;

    /// Delete a tag. Memberships and TAG-scoped sources go with it.
    async fn delete_tag(&self, tag_id: Uuid) -> MetadataResult<bool>;

    /// Ids of tags flagged as default.
    async fn list_default_tag_ids(&self) -> MetadataResult<Vec<Uuid>>;
}

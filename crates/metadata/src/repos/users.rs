//! User and tag-membership repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for users and their tag memberships.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `AlreadyExists` on a duplicate label.
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()>;

    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;

    async fn get_user_by_label(&self, label: &str) -> MetadataResult<Option<UserRow>>;

    /// List users, newest first.
    async fn list_users(&self) -> MetadataResult<Vec<UserRow>>;

    /// Update label, email, description and active flag.
    async fn update_user(&self, user: &UserRow) -> MetadataResult<()>;

    /// Delete a user together with its tokens, memberships, cache entry and
    /// USER-scoped sources. Returns false if the user did not exist.
    async fn delete_user(&self, user_id: Uuid) -> MetadataResult<bool>;

    /// Tag ids held by a user.
    async fn list_user_tag_ids(&self, user_id: Uuid) -> MetadataResult<Vec<Uuid>>;

    /// Replace a user's tag memberships.
    async fn set_user_tags(&self, user_id: Uuid, tag_ids: &[Uuid]) -> MetadataResult<()>;

    /// Attach a tag to several users. Returns how many memberships were added.
    async fn add_tag_to_users(&self, tag_id: Uuid, user_ids: &[Uuid]) -> MetadataResult<u64>;

    /// Ids of users holding a tag.
    async fn list_user_ids_by_tag(&self, tag_id: Uuid) -> MetadataResult<Vec<Uuid>>;
}

//! Static node repository.

use crate::error::MetadataResult;
use crate::models::{SourceFilter, StaticNodeRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for admin-entered static nodes.
#[async_trait]
pub trait StaticNodeRepo: Send + Sync {
    async fn create_static_node(&self, node: &StaticNodeRow) -> MetadataResult<()>;

    async fn get_static_node(&self, static_node_id: Uuid) -> MetadataResult<Option<StaticNodeRow>>;

    async fn list_static_nodes(&self, filter: &SourceFilter) -> MetadataResult<Vec<StaticNodeRow>>;

    /// Update name, content and enabled flag.
    async fn update_static_node(&self, node: &StaticNodeRow) -> MetadataResult<()>;

    async fn delete_static_node(&self, static_node_id: Uuid) -> MetadataResult<bool>;

    /// Enabled static nodes visible to a user, ordered like
    /// [`UpstreamRepo::list_upstreams_for_user`](crate::repos::UpstreamRepo::list_upstreams_for_user).
    async fn list_static_nodes_for_user(&self, user_id: Uuid)
    -> MetadataResult<Vec<StaticNodeRow>>;
}

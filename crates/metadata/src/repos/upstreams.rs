//! Upstream repository.

use crate::error::MetadataResult;
use crate::models::{SourceFilter, UpstreamFetchStatus, UpstreamRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for upstream subscription sources.
#[async_trait]
pub trait UpstreamRepo: Send + Sync {
    async fn create_upstream(&self, upstream: &UpstreamRow) -> MetadataResult<()>;

    async fn get_upstream(&self, upstream_id: Uuid) -> MetadataResult<Option<UpstreamRow>>;

    /// List upstreams matching a filter, newest first.
    async fn list_upstreams(&self, filter: &SourceFilter) -> MetadataResult<Vec<UpstreamRow>>;

    /// Update name, url, enabled flag and kind. Scope and target are immutable.
    async fn update_upstream(&self, upstream: &UpstreamRow) -> MetadataResult<()>;

    async fn delete_upstream(&self, upstream_id: Uuid) -> MetadataResult<bool>;

    /// Enabled upstreams visible to a user: USER first, then TAG (through
    /// the user's tags), then GLOBAL; creation order within each scope.
    async fn list_upstreams_for_user(&self, user_id: Uuid) -> MetadataResult<Vec<UpstreamRow>>;

    /// Record the outcome of the latest fetch.
    async fn update_upstream_fetch_status(
        &self,
        upstream_id: Uuid,
        status: &UpstreamFetchStatus,
    ) -> MetadataResult<()>;
}

//! Upstream and static node management endpoints.

use super::common::{
    format_opt_time, format_time, parse_id, parse_opt_id, read_json, validate_name, validate_url,
};
use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use subhub_core::{SourceScope, SourceTarget};
use subhub_metadata::models::{SourceFilter, StaticNodeRow, UpstreamRow};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_KIND_LEN: usize = 64;

// =============================================================================
// Shared
// =============================================================================

/// Listing filter accepted by both source collections.
#[derive(Debug, Default, Deserialize)]
pub struct ListSourcesQuery {
    pub scope: Option<String>,
    pub user_id: Option<String>,
    pub tag_id: Option<String>,
}

impl ListSourcesQuery {
    fn to_filter(&self) -> ApiResult<SourceFilter> {
        let scope = self
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SourceScope::parse)
            .transpose()?;
        let user_id = parse_opt_id(self.user_id.as_deref(), "user")?;
        let tag_id = parse_opt_id(self.tag_id.as_deref(), "tag")?;

        match scope {
            Some(SourceScope::Global) if user_id.is_some() || tag_id.is_some() => {
                return Err(ApiError::BadRequest(
                    "user_id/tag_id must not be set for GLOBAL scope".to_string(),
                ));
            }
            Some(SourceScope::User) if tag_id.is_some() => {
                return Err(ApiError::BadRequest(
                    "tag_id must not be set for USER scope".to_string(),
                ));
            }
            Some(SourceScope::Tag) if user_id.is_some() => {
                return Err(ApiError::BadRequest(
                    "user_id must not be set for TAG scope".to_string(),
                ));
            }
            _ => {}
        }

        Ok(SourceFilter {
            scope,
            user_id,
            tag_id,
        })
    }
}

/// Parse and validate a scope with its target, checking the target exists.
async fn resolve_target(
    state: &AppState,
    scope: &str,
    user_id: Option<&str>,
    tag_id: Option<&str>,
) -> ApiResult<SourceTarget> {
    let scope = SourceScope::parse(scope.trim())?;
    let user_id = parse_opt_id(user_id, "user")?;
    let tag_id = parse_opt_id(tag_id, "tag")?;
    let target = SourceTarget::new(scope, user_id, tag_id)?;

    match target {
        SourceTarget::User(user_id) => {
            if state.metadata.get_user(user_id).await?.is_none() {
                return Err(ApiError::BadRequest(format!("user {user_id} does not exist")));
            }
        }
        SourceTarget::Tag(tag_id) => {
            if state.metadata.get_tag(tag_id).await?.is_none() {
                return Err(ApiError::BadRequest(format!("tag {tag_id} does not exist")));
            }
        }
        SourceTarget::Global => {}
    }
    Ok(target)
}

async fn invalidate_target(state: &AppState, target: SourceTarget) -> ApiResult<()> {
    state
        .invalidator
        .invalidate_by_source_target(target.scope(), target.user_id(), target.tag_id())
        .await?;
    Ok(())
}

fn validate_kind(raw: Option<String>) -> ApiResult<Option<String>> {
    let Some(kind) = raw else {
        return Ok(None);
    };
    let kind = kind.trim();
    if kind.is_empty() {
        return Ok(None);
    }
    if kind.chars().count() > MAX_KIND_LEN {
        return Err(ApiError::BadRequest(format!(
            "kind must be at most {MAX_KIND_LEN} characters"
        )));
    }
    Ok(Some(kind.to_string()))
}

fn validate_content(raw: &str) -> ApiResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content cannot be empty".to_string()));
    }
    Ok(content.to_string())
}

// =============================================================================
// Upstreams
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUpstreamRequest {
    pub name: String,
    pub url: String,
    pub scope: String,
    pub user_id: Option<String>,
    pub tag_id: Option<String>,
    pub enabled: Option<bool>,
    pub kind: Option<String>,
}

/// Scope and target are fixed at creation.
#[derive(Debug, Deserialize)]
pub struct UpdateUpstreamRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamResponse {
    pub upstream_id: String,
    pub name: String,
    pub url: String,
    pub scope: String,
    pub user_id: Option<String>,
    pub tag_id: Option<String>,
    pub enabled: bool,
    pub kind: Option<String>,
    pub last_fetch_status: Option<i64>,
    pub last_fetch_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListUpstreamsResponse {
    pub upstreams: Vec<UpstreamResponse>,
}

fn upstream_row_to_response(row: UpstreamRow) -> ApiResult<UpstreamResponse> {
    Ok(UpstreamResponse {
        upstream_id: row.upstream_id.to_string(),
        name: row.name,
        url: row.url,
        scope: row.scope,
        user_id: row.user_id.map(|id| id.to_string()),
        tag_id: row.tag_id.map(|id| id.to_string()),
        enabled: row.enabled,
        kind: row.kind,
        last_fetch_status: row.last_fetch_status,
        last_fetch_at: format_opt_time(row.last_fetch_at)?,
        last_error: row.last_error,
        created_at: format_time(row.created_at)?,
        updated_at: format_time(row.updated_at)?,
    })
}

/// POST /v1/admin/upstreams
pub async fn create_upstream(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<UpstreamResponse>)> {
    require_admin(&req)?;
    let body: CreateUpstreamRequest = read_json(req).await?;

    let name = validate_name(&body.name, "name")?;
    let url = validate_url(&body.url)?;
    let kind = validate_kind(body.kind)?;
    let target = resolve_target(
        &state,
        &body.scope,
        body.user_id.as_deref(),
        body.tag_id.as_deref(),
    )
    .await?;

    let now = OffsetDateTime::now_utc();
    let row = UpstreamRow {
        upstream_id: Uuid::new_v4(),
        name,
        url,
        scope: target.scope().as_str().to_string(),
        user_id: target.user_id(),
        tag_id: target.tag_id(),
        enabled: body.enabled.unwrap_or(true),
        kind,
        last_fetch_status: None,
        last_fetch_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_upstream(&row).await?;
    invalidate_target(&state, target).await?;

    tracing::info!(upstream_id = %row.upstream_id, scope = %row.scope, "upstream created");
    Ok((StatusCode::CREATED, Json(upstream_row_to_response(row)?)))
}

/// GET /v1/admin/upstreams - List upstreams, newest first.
pub async fn list_upstreams(
    State(state): State<AppState>,
    Query(query): Query<ListSourcesQuery>,
    req: Request,
) -> ApiResult<Json<ListUpstreamsResponse>> {
    require_admin(&req)?;
    let filter = query.to_filter()?;

    let upstreams = state
        .metadata
        .list_upstreams(&filter)
        .await?
        .into_iter()
        .map(upstream_row_to_response)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(ListUpstreamsResponse { upstreams }))
}

/// PUT /v1/admin/upstreams/{upstream_id}
pub async fn update_upstream(
    State(state): State<AppState>,
    Path(upstream_id): Path<String>,
    req: Request,
) -> ApiResult<Json<UpstreamResponse>> {
    require_admin(&req)?;
    let upstream_id = parse_id(&upstream_id, "upstream")?;
    let body: UpdateUpstreamRequest = read_json(req).await?;

    if body.name.is_none() && body.url.is_none() && body.enabled.is_none() && body.kind.is_none() {
        return Err(ApiError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let mut row = state
        .metadata
        .get_upstream(upstream_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upstream not found".to_string()))?;

    if let Some(name) = &body.name {
        row.name = validate_name(name, "name")?;
    }
    if let Some(url) = &body.url {
        row.url = validate_url(url)?;
    }
    if let Some(enabled) = body.enabled {
        row.enabled = enabled;
    }
    if body.kind.is_some() {
        row.kind = validate_kind(body.kind)?;
    }
    row.updated_at = OffsetDateTime::now_utc();

    state.metadata.update_upstream(&row).await?;
    invalidate_target(&state, row.target()?).await?;

    Ok(Json(upstream_row_to_response(row)?))
}

/// DELETE /v1/admin/upstreams/{upstream_id}
pub async fn delete_upstream(
    State(state): State<AppState>,
    Path(upstream_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_admin(&req)?;
    let upstream_id = parse_id(&upstream_id, "upstream")?;

    let row = state
        .metadata
        .get_upstream(upstream_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upstream not found".to_string()))?;
    let target = row.target()?;

    state.metadata.delete_upstream(upstream_id).await?;
    invalidate_target(&state, target).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Static nodes
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateStaticNodeRequest {
    pub name: String,
    pub content: String,
    pub scope: String,
    pub user_id: Option<String>,
    pub tag_id: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStaticNodeRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StaticNodeResponse {
    pub static_node_id: String,
    pub name: String,
    pub content: String,
    pub scope: String,
    pub user_id: Option<String>,
    pub tag_id: Option<String>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListStaticNodesResponse {
    pub static_nodes: Vec<StaticNodeResponse>,
}

fn static_node_row_to_response(row: StaticNodeRow) -> ApiResult<StaticNodeResponse> {
    Ok(StaticNodeResponse {
        static_node_id: row.static_node_id.to_string(),
        name: row.name,
        content: row.content,
        scope: row.scope,
        user_id: row.user_id.map(|id| id.to_string()),
        tag_id: row.tag_id.map(|id| id.to_string()),
        enabled: row.enabled,
        created_at: format_time(row.created_at)?,
        updated_at: format_time(row.updated_at)?,
    })
}

/// POST /v1/admin/static-nodes
pub async fn create_static_node(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<StaticNodeResponse>)> {
    require_admin(&req)?;
    let body: CreateStaticNodeRequest = read_json(req).await?;

    let name = validate_name(&body.name, "name")?;
    let content = validate_content(&body.content)?;
    let target = resolve_target(
        &state,
        &body.scope,
        body.user_id.as_deref(),
        body.tag_id.as_deref(),
    )
    .await?;

    let now = OffsetDateTime::now_utc();
    let row = StaticNodeRow {
        static_node_id: Uuid::new_v4(),
        name,
        content,
        scope: target.scope().as_str().to_string(),
        user_id: target.user_id(),
        tag_id: target.tag_id(),
        enabled: body.enabled.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_static_node(&row).await?;
    invalidate_target(&state, target).await?;

    Ok((StatusCode::CREATED, Json(static_node_row_to_response(row)?)))
}

/// GET /v1/admin/static-nodes - List static nodes, newest first.
pub async fn list_static_nodes(
    State(state): State<AppState>,
    Query(query): Query<ListSourcesQuery>,
    req: Request,
) -> ApiResult<Json<ListStaticNodesResponse>> {
    require_admin(&req)?;
    let filter = query.to_filter()?;

    let static_nodes = state
        .metadata
        .list_static_nodes(&filter)
        .await?
        .into_iter()
        .map(static_node_row_to_response)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(ListStaticNodesResponse { static_nodes }))
}

/// PUT /v1/admin/static-nodes/{static_node_id}
pub async fn update_static_node(
    State(state): State<AppState>,
    Path(static_node_id): Path<String>,
    req: Request,
) -> ApiResult<Json<StaticNodeResponse>> {
    require_admin(&req)?;
    let static_node_id = parse_id(&static_node_id, "static node")?;
    let body: UpdateStaticNodeRequest = read_json(req).await?;

    if body.name.is_none() && body.content.is_none() && body.enabled.is_none() {
        return Err(ApiError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let mut row = state
        .metadata
        .get_static_node(static_node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("static node not found".to_string()))?;

    if let Some(name) = &body.name {
        row.name = validate_name(name, "name")?;
    }
    if let Some(content) = &body.content {
        row.content = validate_content(content)?;
    }
    if let Some(enabled) = body.enabled {
        row.enabled = enabled;
    }
    row.updated_at = OffsetDateTime::now_utc();

    state.metadata.update_static_node(&row).await?;
    invalidate_target(&state, row.target()?).await?;

    Ok(Json(static_node_row_to_response(row)?))
}

/// DELETE /v1/admin/static-nodes/{static_node_id}
pub async fn delete_static_node(
    State(state): State<AppState>,
    Path(static_node_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_admin(&req)?;
    let static_node_id = parse_id(&static_node_id, "static node")?;

    let row = state
        .metadata
        .get_static_node(static_node_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("static node not found".to_string()))?;
    let target = row.target()?;

    state.metadata.delete_static_node(static_node_id).await?;
    invalidate_target(&state, target).await?;

    Ok(StatusCode::NO_CONTENT)
}

//! Tag management endpoints.

use super::common::{format_time, parse_id, read_json, validate_name};
use super::users::issue_subscription_token;
use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use subhub_metadata::models::{TagRow, normalize_tag_name};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTagRequest {
    pub name: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub tag_id: String,
    pub name: String,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListTagsResponse {
    pub tags: Vec<TagResponse>,
}

/// Which users a tag is applied to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplyMode {
    /// Only the listed `user_ids`.
    #[default]
    Users,
    /// Every existing user.
    All,
}

#[derive(Debug, Deserialize)]
pub struct ApplyTagRequest {
    #[serde(default)]
    pub mode: ApplyMode,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyTagResponse {
    pub mode: ApplyMode,
    /// Users that exist among the targets.
    pub matched_users: usize,
    /// Users that did not hold the tag before.
    pub affected_users: u64,
}

/// Bulk action over every holder of a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagAction {
    DeactivateUsers,
    DeleteUsers,
    RotateTokens,
}

#[derive(Debug, Deserialize)]
pub struct TagActionRequest {
    pub action: TagAction,
}

#[derive(Debug, Serialize)]
pub struct TagActionResponse {
    pub action: TagAction,
    pub matched_users: usize,
    pub affected_users: usize,
}

fn tag_row_to_response(tag: TagRow) -> ApiResult<TagResponse> {
    Ok(TagResponse {
        tag_id: tag.tag_id.to_string(),
        name: tag.name,
        is_default: tag.is_default,
        created_at: format_time(tag.created_at)?,
        updated_at: format_time(tag.updated_at)?,
    })
}

async fn load_tag(state: &AppState, tag_id: Uuid) -> ApiResult<TagRow> {
    state
        .metadata
        .get_tag(tag_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("tag not found".to_string()))
}

/// POST /v1/admin/tags - Create a tag. Names are unique case-insensitively.
pub async fn create_tag(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<TagResponse>)> {
    require_admin(&req)?;
    let body: CreateTagRequest = read_json(req).await?;

    let name = validate_name(&body.name, "name")?;
    let normalized_name = normalize_tag_name(&name);
    if state
        .metadata
        .get_tag_by_normalized_name(&normalized_name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!("tag '{name}' already exists")));
    }

    let now = OffsetDateTime::now_utc();
    let tag = TagRow {
        tag_id: Uuid::new_v4(),
        name,
        normalized_name,
        is_default: body.is_default,
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_tag(&tag).await?;

    Ok((StatusCode::CREATED, Json(tag_row_to_response(tag)?)))
}

/// GET /v1/admin/tags - List tags, newest first.
pub async fn list_tags(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ListTagsResponse>> {
    require_admin(&req)?;

    let tags = state
        .metadata
        .list_tags()
        .await?
        .into_iter()
        .map(tag_row_to_response)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(ListTagsResponse { tags }))
}

/// GET /v1/admin/tags/{tag_id}
pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    req: Request,
) -> ApiResult<Json<TagResponse>> {
    require_admin(&req)?;
    let tag_id = parse_id(&tag_id, "tag")?;

    Ok(Json(tag_row_to_response(load_tag(&state, tag_id).await?)?))
}

/// PUT /v1/admin/tags/{tag_id}
pub async fn update_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    req: Request,
) -> ApiResult<Json<TagResponse>> {
    require_admin(&req)?;
    let tag_id = parse_id(&tag_id, "tag")?;
    let body: UpdateTagRequest = read_json(req).await?;

    if body.name.is_none() && body.is_default.is_none() {
        return Err(ApiError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let mut tag = load_tag(&state, tag_id).await?;

    if let Some(name) = &body.name {
        let name = validate_name(name, "name")?;
        let normalized_name = normalize_tag_name(&name);
        if let Some(existing) = state
            .metadata
            .get_tag_by_normalized_name(&normalized_name)
            .await?
            && existing.tag_id != tag.tag_id
        {
            return Err(ApiError::Conflict(format!("tag '{name}' already exists")));
        }
        tag.name = name;
        tag.normalized_name = normalized_name;
    }
    if let Some(is_default) = body.is_default {
        tag.is_default = is_default;
    }
    tag.updated_at = OffsetDateTime::now_utc();

    state.metadata.update_tag(&tag).await?;

    Ok(Json(tag_row_to_response(tag)?))
}

/// DELETE /v1/admin/tags/{tag_id} - Delete a tag, detaching it from users and
/// removing its TAG-scoped sources.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_admin(&req)?;
    let tag_id = parse_id(&tag_id, "tag")?;
    load_tag(&state, tag_id).await?;

    // Holders must be read before the membership rows cascade away.
    let holders = state.metadata.list_user_ids_by_tag(tag_id).await?;
    if !state.metadata.delete_tag(tag_id).await? {
        return Err(ApiError::NotFound("tag not found".to_string()));
    }
    state.invalidator.invalidate_users(&holders).await?;

    tracing::info!(tag_id = %tag_id, detached_users = holders.len(), "tag deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/tags/{tag_id}/apply - Add the tag to users.
pub async fn apply_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ApplyTagResponse>> {
    require_admin(&req)?;
    let tag_id = parse_id(&tag_id, "tag")?;
    let body: ApplyTagRequest = read_json(req).await?;
    load_tag(&state, tag_id).await?;

    let targets: Vec<Uuid> = match body.mode {
        ApplyMode::All => state
            .metadata
            .list_users()
            .await?
            .into_iter()
            .map(|u| u.user_id)
            .collect(),
        ApplyMode::Users => {
            let mut seen = HashSet::new();
            let mut existing = Vec::new();
            for raw in &body.user_ids {
                let user_id = parse_id(raw.trim(), "user")?;
                if seen.insert(user_id) && state.metadata.get_user(user_id).await?.is_some() {
                    existing.push(user_id);
                }
            }
            existing
        }
    };

    if targets.is_empty() {
        return Ok(Json(ApplyTagResponse {
            mode: body.mode,
            matched_users: 0,
            affected_users: 0,
        }));
    }

    let affected_users = state.metadata.add_tag_to_users(tag_id, &targets).await?;
    state.invalidator.invalidate_users(&targets).await?;

    Ok(Json(ApplyTagResponse {
        mode: body.mode,
        matched_users: targets.len(),
        affected_users,
    }))
}

/// POST /v1/admin/tags/{tag_id}/actions - Run a bulk action on the tag's users.
pub async fn run_tag_action(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
    req: Request,
) -> ApiResult<Json<TagActionResponse>> {
    require_admin(&req)?;
    let tag_id = parse_id(&tag_id, "tag")?;
    let body: TagActionRequest = read_json(req).await?;
    load_tag(&state, tag_id).await?;

    let holders = state.metadata.list_user_ids_by_tag(tag_id).await?;
    let mut affected_users = 0;

    for user_id in &holders {
        match body.action {
            TagAction::DeactivateUsers => {
                if let Some(mut user) = state.metadata.get_user(*user_id).await?
                    && user.is_active
                {
                    user.is_active = false;
                    user.updated_at = OffsetDateTime::now_utc();
                    state.metadata.update_user(&user).await?;
                    affected_users += 1;
                }
            }
            TagAction::DeleteUsers => {
                if state.metadata.delete_user(*user_id).await? {
                    affected_users += 1;
                }
            }
            TagAction::RotateTokens => {
                issue_subscription_token(state.metadata.as_ref(), *user_id).await?;
                affected_users += 1;
            }
        }
    }
    state.invalidator.invalidate_users(&holders).await?;

    tracing::info!(
        tag_id = %tag_id,
        action = ?body.action,
        matched_users = holders.len(),
        affected_users,
        "tag action completed"
    );

    Ok(Json(TagActionResponse {
        action: body.action,
        matched_users: holders.len(),
        affected_users,
    }))
}

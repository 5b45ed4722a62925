//! User management endpoints.

use super::common::{
    format_opt_time, format_time, parse_id, read_json, validate_name,
};
use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::resolver::PreviewReport;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use subhub_core::token::{TokenScope, generate_token_secret, hash_token, scopes_to_json};
use subhub_metadata::MetadataStore;
use subhub_metadata::models::{TokenRow, UserRow};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_EMAIL_LEN: usize = 254;
const MAX_DESCRIPTION_LEN: usize = 1000;

// =============================================================================
// Types
// =============================================================================

/// Request to create a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub label: String,
    pub email: Option<String>,
    pub description: Option<String>,
    /// Tags to attach in addition to the default tags.
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

/// Request to update a user. Omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub label: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the user's tag set when present.
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub label: String,
    pub email: Option<String>,
    pub description: String,
    pub is_active: bool,
    pub tag_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Metadata of the user's active subscription token. The secret itself is
/// only returned when the token is issued.
#[derive(Debug, Serialize)]
pub struct ActiveTokenResponse {
    pub token_id: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub active_token: Option<ActiveTokenResponse>,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
}

/// Returned when a token secret is issued.
#[derive(Debug, Serialize)]
pub struct IssuedTokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    pub token: String,
}

fn user_row_to_response(user: UserRow, tag_ids: Vec<Uuid>) -> ApiResult<UserResponse> {
    Ok(UserResponse {
        user_id: user.user_id.to_string(),
        label: user.label,
        email: user.email,
        description: user.description,
        is_active: user.is_active,
        tag_ids: tag_ids.iter().map(Uuid::to_string).collect(),
        created_at: format_time(user.created_at)?,
        updated_at: format_time(user.updated_at)?,
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_email(raw: Option<String>) -> ApiResult<Option<String>> {
    let Some(email) = raw else {
        return Ok(None);
    };
    let email = email.trim();
    if email.is_empty() {
        return Ok(None);
    }
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(ApiError::BadRequest("invalid email".to_string()));
    }
    Ok(Some(email.to_string()))
}

fn validate_description(raw: Option<String>) -> ApiResult<String> {
    let description = raw.unwrap_or_default().trim().to_string();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(description)
}

/// Parse tag ids, drop duplicates and check every tag exists.
async fn resolve_tag_ids(metadata: &dyn MetadataStore, raw: &[String]) -> ApiResult<Vec<Uuid>> {
    let mut seen = HashSet::new();
    let mut tag_ids = Vec::with_capacity(raw.len());
    for raw_id in raw {
        let tag_id = parse_id(raw_id.trim(), "tag")?;
        if !seen.insert(tag_id) {
            continue;
        }
        if metadata.get_tag(tag_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("tag {tag_id} does not exist")));
        }
        tag_ids.push(tag_id);
    }
    Ok(tag_ids)
}

/// Union of requested and default tags, requested first.
pub(crate) fn merge_tag_ids(requested: &[Uuid], defaults: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    requested
        .iter()
        .chain(defaults.iter())
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Revoke every active token of the user and issue a fresh one.
/// Returns the new secret.
pub(crate) async fn issue_subscription_token(
    metadata: &dyn MetadataStore,
    user_id: Uuid,
) -> ApiResult<String> {
    let now = OffsetDateTime::now_utc();
    let revoked = metadata.revoke_user_tokens(user_id, now).await?;

    let secret = generate_token_secret();
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: Some(user_id),
        token_hash: hash_token(&secret),
        scopes: scopes_to_json(&[TokenScope::SubscriptionRead]),
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: Some("subscription".to_string()),
    };
    metadata.create_token(&token).await?;

    tracing::info!(
        user_id = %user_id,
        token_id = %token.token_id,
        revoked,
        "subscription token issued"
    );
    Ok(secret)
}

async fn load_user(state: &AppState, user_id: Uuid) -> ApiResult<UserRow> {
    state
        .metadata
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /v1/admin/users - Create a user and issue its first token.
pub async fn create_user(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateUserResponse>)> {
    require_admin(&req)?;
    let body: CreateUserRequest = read_json(req).await?;

    let label = validate_name(&body.label, "label")?;
    let email = validate_email(body.email)?;
    let description = validate_description(body.description)?;

    if state.metadata.get_user_by_label(&label).await?.is_some() {
        return Err(ApiError::Conflict(format!("label '{label}' already exists")));
    }

    let requested = resolve_tag_ids(state.metadata.as_ref(), &body.tag_ids).await?;
    let defaults = state.metadata.list_default_tag_ids().await?;
    let tag_ids = merge_tag_ids(&requested, &defaults);

    let now = OffsetDateTime::now_utc();
    let user = UserRow {
        user_id: Uuid::new_v4(),
        label,
        email,
        description,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_user(&user).await?;
    state.metadata.set_user_tags(user.user_id, &tag_ids).await?;
    let token = issue_subscription_token(state.metadata.as_ref(), user.user_id).await?;

    tracing::info!(user_id = %user.user_id, label = %user.label, "user created");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user: user_row_to_response(user, tag_ids)?,
            token,
        }),
    ))
}

/// GET /v1/admin/users - List users, newest first.
pub async fn list_users(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ListUsersResponse>> {
    require_admin(&req)?;

    let rows = state.metadata.list_users().await?;
    let mut users = Vec::with_capacity(rows.len());
    for user in rows {
        let tag_ids = state.metadata.list_user_tag_ids(user.user_id).await?;
        users.push(user_row_to_response(user, tag_ids)?);
    }

    Ok(Json(ListUsersResponse { users }))
}

/// GET /v1/admin/users/{user_id} - Get a user with its active token metadata.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Request,
) -> ApiResult<Json<UserDetailResponse>> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id, "user")?;

    let user = load_user(&state, user_id).await?;
    let tag_ids = state.metadata.list_user_tag_ids(user_id).await?;

    let now = OffsetDateTime::now_utc();
    let active_token = state
        .metadata
        .list_user_tokens(user_id)
        .await?
        .into_iter()
        .find(|t| t.revoked_at.is_none() && !t.is_expired_at(now))
        .map(|t| -> ApiResult<ActiveTokenResponse> {
            Ok(ActiveTokenResponse {
                token_id: t.token_id.to_string(),
                created_at: format_time(t.created_at)?,
                last_used_at: format_opt_time(t.last_used_at)?,
            })
        })
        .transpose()?;

    Ok(Json(UserDetailResponse {
        user: user_row_to_response(user, tag_ids)?,
        active_token,
    }))
}

/// PUT /v1/admin/users/{user_id} - Update a user.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Request,
) -> ApiResult<Json<UserResponse>> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id, "user")?;
    let body: UpdateUserRequest = read_json(req).await?;

    if body.label.is_none()
        && body.email.is_none()
        && body.description.is_none()
        && body.is_active.is_none()
        && body.tag_ids.is_none()
    {
        return Err(ApiError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let mut user = load_user(&state, user_id).await?;

    if let Some(label) = &body.label {
        let label = validate_name(label, "label")?;
        if let Some(existing) = state.metadata.get_user_by_label(&label).await?
            && existing.user_id != user.user_id
        {
            return Err(ApiError::Conflict(format!("label '{label}' already exists")));
        }
        user.label = label;
    }
    if body.email.is_some() {
        user.email = validate_email(body.email)?;
    }
    if body.description.is_some() {
        user.description = validate_description(body.description)?;
    }
    if let Some(is_active) = body.is_active {
        user.is_active = is_active;
    }
    user.updated_at = OffsetDateTime::now_utc();

    state.metadata.update_user(&user).await?;

    if let Some(raw) = &body.tag_ids {
        let tag_ids = resolve_tag_ids(state.metadata.as_ref(), raw).await?;
        state.metadata.set_user_tags(user_id, &tag_ids).await?;
    }

    state.invalidator.invalidate_users(&[user_id]).await?;

    let tag_ids = state.metadata.list_user_tag_ids(user_id).await?;
    Ok(Json(user_row_to_response(user, tag_ids)?))
}

/// DELETE /v1/admin/users/{user_id} - Delete a user with its tokens, USER
/// sources and cached subscription.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id, "user")?;

    if !state.metadata.delete_user(user_id).await? {
        return Err(ApiError::NotFound("user not found".to_string()));
    }
    tracing::info!(user_id = %user_id, "user deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/users/{user_id}/rotate-token - Replace the user's token.
pub async fn rotate_token(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Request,
) -> ApiResult<Json<IssuedTokenResponse>> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id, "user")?;
    load_user(&state, user_id).await?;

    let token = issue_subscription_token(state.metadata.as_ref(), user_id).await?;
    state.invalidator.invalidate_users(&[user_id]).await?;

    Ok(Json(IssuedTokenResponse { token }))
}

/// GET /v1/admin/users/{user_id}/preview - Dry-run the user's subscription.
pub async fn preview_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Request,
) -> ApiResult<Json<PreviewReport>> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id, "user")?;

    let report = state.resolver.preview_for_user(user_id).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_requested_first_without_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_eq!(merge_tag_ids(&[a, b], &[b, c]), vec![a, b, c]);
        assert_eq!(merge_tag_ids(&[], &[c]), vec![c]);
    }

    #[test]
    fn email_validation() {
        assert_eq!(validate_email(None).unwrap(), None);
        assert_eq!(validate_email(Some("  ".into())).unwrap(), None);
        assert_eq!(
            validate_email(Some(" a@b.example ".into())).unwrap(),
            Some("a@b.example".to_string())
        );
        assert!(validate_email(Some("nope".into())).is_err());
    }
}

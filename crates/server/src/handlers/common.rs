//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Maximum request body size for admin endpoints (1 MiB).
pub const MAX_ADMIN_BODY_SIZE: usize = 1024 * 1024;

/// Maximum length of user labels, tag names and source names.
pub const MAX_NAME_LEN: usize = 120;

/// Maximum length of an upstream URL.
pub const MAX_URL_LEN: usize = 2048;

/// Read and deserialize a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

pub fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid {what} ID: {e}")))
}

pub fn format_time(t: OffsetDateTime) -> ApiResult<String> {
    t.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

pub fn format_opt_time(t: Option<OffsetDateTime>) -> ApiResult<Option<String>> {
    t.map(format_time).transpose()
}

/// Trim a name and check it is non-empty and at most MAX_NAME_LEN characters.
pub fn validate_name(raw: &str, field: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} cannot be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Trim a URL and check it parses as absolute http(s).
pub fn validate_url(raw: &str) -> ApiResult<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url cannot be empty".to_string()));
    }
    if url.len() > MAX_URL_LEN {
        return Err(ApiError::BadRequest(format!(
            "url must be at most {MAX_URL_LEN} characters"
        )));
    }
    let parsed =
        url::Url::parse(url).map_err(|e| ApiError::BadRequest(format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ApiError::BadRequest("url must be an HTTP or HTTPS URL".to_string()));
    }
    Ok(url.to_string())
}

/// Parse an optional UUID string field from a request body or query.
pub fn parse_opt_id(raw: Option<&str>, what: &str) -> ApiResult<Option<Uuid>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(s, what))
        .transpose()
}

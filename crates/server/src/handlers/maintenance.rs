//! Operational admin endpoints: upstream probing and cache flushing.

use super::common::{read_json, validate_url};
use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use subhub_fetch::FetchError;

/// Characters of the fetched body echoed back by a test fetch.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct TestFetchRequest {
    pub url: String,
}

/// Result of probing an upstream URL. Fetch failures are reported in the
/// body, not as an HTTP error.
#[derive(Debug, Serialize)]
pub struct TestFetchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// POST /v1/admin/test-fetch - Fetch a URL once through the upstream fetcher.
///
/// Goes through the same host guard as real upstreams; unsafe URLs are
/// rejected with 400 rather than reported as a failed probe.
pub async fn test_fetch(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<TestFetchResponse>> {
    require_admin(&req)?;
    let body: TestFetchRequest = read_json(req).await?;
    let url = validate_url(&body.url)?;

    let start = Instant::now();
    let result = state.fetcher.fetch(&url).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let response = match result {
        Ok(text) => TestFetchResponse {
            success: true,
            status: Some(200),
            duration_ms,
            size: Some(text.len()),
            preview: Some(preview(&text)),
            error: None,
        },
        Err(e) if e.is_unsafe() => return Err(ApiError::from(e)),
        Err(e) => {
            let status = match &e {
                FetchError::Status(code) => Some(*code),
                _ => None,
            };
            tracing::info!(url = %url, error = %e, "test fetch failed");
            TestFetchResponse {
                success: false,
                status,
                duration_ms,
                size: None,
                preview: None,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}

/// DELETE /v1/admin/cache - Drop every cached subscription.
pub async fn flush_cache(State(state): State<AppState>, req: Request) -> ApiResult<StatusCode> {
    require_admin(&req)?;

    let removed = state.invalidator.invalidate_all().await?;
    tracing::info!(removed, "subscription cache flushed");

    Ok(StatusCode::NO_CONTENT)
}

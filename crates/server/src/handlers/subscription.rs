//! Public subscription endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

/// Query parameters for the subscription endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    /// `plain` (default) or `base64`.
    pub format: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyFormat {
    Plain,
    Base64,
}

impl BodyFormat {
    fn parse(raw: Option<&str>) -> ApiResult<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("plain") => Ok(Self::Plain),
            Some(f) if f.eq_ignore_ascii_case("base64") => Ok(Self::Base64),
            Some(other) => Err(ApiError::BadRequest(format!("unsupported format: {other}"))),
        }
    }
}

/// Whether any `If-None-Match` entry matches `etag` under weak comparison.
///
/// Entries are comma separated and may span several header lines; `*`
/// matches any current representation.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let current = etag.trim_start_matches("W/");
    headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|tag| tag == "*" || tag.trim_start_matches("W/") == current)
}

/// GET /subs/{token} - Serve a user's merged subscription.
///
/// Answers 304 when `If-None-Match` lists the current ETag or `*`.
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<SubscriptionQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = BodyFormat::parse(query.format.as_deref())?;

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::TokenNotFound);
    }

    let rendered = match state.resolver.resolve_by_token(token).await {
        Ok(rendered) => rendered,
        Err(e) => {
            metrics::record_subscription_outcome(e.outcome());
            return Err(e.into());
        }
    };

    let etag = HeaderValue::from_str(&rendered.etag)
        .map_err(|e| ApiError::Internal(format!("invalid etag: {e}")))?;

    if if_none_match(&headers, &rendered.etag) {
        metrics::record_subscription_outcome("not_modified");
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
    }

    let body = match format {
        BodyFormat::Base64 => rendered.content_base64,
        BodyFormat::Plain => rendered
            .decoded()
            .map_err(|e| ApiError::Internal(format!("corrupt cached subscription: {e}")))?,
    };

    metrics::record_subscription_outcome("ok");
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (ETAG, etag),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(BodyFormat::parse(None).unwrap(), BodyFormat::Plain);
        assert_eq!(BodyFormat::parse(Some("base64")).unwrap(), BodyFormat::Base64);
        assert_eq!(BodyFormat::parse(Some("BASE64")).unwrap(), BodyFormat::Base64);
        assert!(BodyFormat::parse(Some("clash")).is_err());
    }

    fn with_if_none_match(values: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &value in values {
            headers.append(IF_NONE_MATCH, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn if_none_match_lists() {
        let etag = r#"W/"1f-18c2a""#;

        assert!(if_none_match(&with_if_none_match(&[r#"W/"1f-18c2a""#]), etag));
        assert!(if_none_match(
            &with_if_none_match(&[r#""other", W/"1f-18c2a""#]),
            etag
        ));
        assert!(if_none_match(
            &with_if_none_match(&[r#""other""#, r#" W/"1f-18c2a" "#]),
            etag
        ));
        assert!(if_none_match(&with_if_none_match(&["*"]), etag));
        assert!(if_none_match(&with_if_none_match(&[r#""1f-18c2a""#]), etag));

        assert!(!if_none_match(&HeaderMap::new(), etag));
        assert!(!if_none_match(
            &with_if_none_match(&[r#""other", W/"20-18c2a""#]),
            etag
        ));
    }
}

//! HTTP fetcher backed by reqwest.

use crate::error::{FetchError, FetchResult};
use crate::guard::{check_parsed, check_url};
use crate::sniff::looks_like_html;
use crate::traits::Fetcher;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, USER_AGENT};
use reqwest::redirect::{Attempt, Policy};
use subhub_core::config::FetchConfig;
use url::Url;

const MAX_REDIRECTS: usize = 5;

/// Fetcher that talks HTTP(S) to upstream providers.
///
/// The first request goes out without a User-Agent. If the body looks like an
/// HTML page, one retry is made with the configured curl-style agent and its
/// body is used unless it is HTML as well.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher from configuration.
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        config.validate().map_err(FetchError::Config)?;

        let allow_private_hosts = config.allow_private_hosts;
        let redirect = Policy::custom(move |attempt: Attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(FetchError::Network("too many redirects".to_string()));
            }
            match check_parsed(attempt.url(), allow_private_hosts) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(redirect)
            .build()
            .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn get_once(&self, url: &Url, user_agent: Option<&str>) -> FetchResult<String> {
        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, self.config.accept.as_str());
        if let Some(agent) = user_agent {
            request = request.header(USER_AGENT, agent);
        }

        let mut response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.config.max_bytes;
        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(declared) = declared
            && declared > limit
        {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if body.len() as u64 + chunk.len() as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout(self.config.timeout_ms);
        }
        // Errors raised by the redirect policy come back wrapped.
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(fetch_err) = inner.downcast_ref::<FetchError>() {
                return match fetch_err {
                    FetchError::UnsafeUrl(url) => FetchError::UnsafeUrl(url.clone()),
                    other => FetchError::Network(other.to_string()),
                };
            }
            source = inner.source();
        }
        FetchError::Network(err.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        let url = check_url(url, self.config.allow_private_hosts)?;

        let first = self.get_once(&url, None).await?;
        if !looks_like_html(&first) {
            return Ok(first);
        }

        tracing::debug!(%url, "upstream returned HTML, retrying with alternate user agent");
        match self
            .get_once(&url, Some(self.config.retry_user_agent.as_str()))
            .await
        {
            Ok(retry) if !looks_like_html(&retry) => Ok(retry),
            Ok(_) => Ok(first),
            Err(e) => {
                tracing::warn!(%url, error = %e, "retry after HTML response failed");
                Ok(first)
            }
        }
    }
}

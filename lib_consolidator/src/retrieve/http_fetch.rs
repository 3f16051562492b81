//! # HTTP Transport
//!
//! A [`Fetch`] implementation over `reqwest`. Paths are resolved against a
//! base URL and fetched with `GET`. Transient failures (connection resets,
//! 5xx, 429) are retried by `reqwest-retry` with exponential backoff before a
//! response, or a transport error, is handed back to the engine.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use url::Url;

use crate::core::transport::{Fetch, FetchResponse};
use crate::errors::ConsolidatorError;

/// Tuning knobs for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures inside a single fetch.
    pub max_retries: u32,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// An optional Bearer token used for authorization.
    pub auth_token: Option<String>,
}

impl Default for HttpFetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            user_agent: "poll-consolidator/0.1".to_string(),
            auth_token: None,
        }
    }
}

/// Fetches paths relative to a base URL.
pub struct HttpFetcher {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL every path is joined to. Always ends with `/`.
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher with default options.
    ///
    /// # Errors
    /// `InvalidBaseUrl` if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> Result<Self, ConsolidatorError> {
        Self::with_options(base_url, HttpFetchOptions::default())
    }

    pub fn with_options(base_url: &str, options: HttpFetchOptions) -> Result<Self, ConsolidatorError> {
        let mut url = Url::parse(base_url).map_err(|e| ConsolidatorError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ConsolidatorError::InvalidBaseUrl(base_url.to_string()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| ConsolidatorError::Transport(e.to_string()))?;

        // Configure an exponential backoff policy for transient failures
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            base_url: url,
            auth_token: options.auth_token,
        })
    }

    /// The absolute URL `path` is fetched from.
    pub fn url_for(&self, path: &str) -> Result<Url, ConsolidatorError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConsolidatorError::InvalidPath(format!("{}: {}", path, e)))
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<FetchResponse, ConsolidatorError> {
        let url = self.url_for(path)?;
        let mut req = self.inner.get(url).header(ACCEPT, "application/json");
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = req
            .send()
            .await
            .map_err(|e| ConsolidatorError::Transport(e.to_string()))?;
        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| ConsolidatorError::Transport(e.to_string()))?;

        Ok(FetchResponse {
            status_code,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_join_under_base_path() {
        let fetcher = HttpFetcher::new("http://127.0.0.1:8080/api").unwrap();
        assert_eq!(fetcher.url_for("/a/b").unwrap().as_str(), "http://127.0.0.1:8080/api/a/b");

        let fetcher = HttpFetcher::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(fetcher.url_for("/a").unwrap().as_str(), "http://127.0.0.1:8080/a");
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        assert!(matches!(
            HttpFetcher::new("not a url"),
            Err(ConsolidatorError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpFetcher::new("mailto:someone@example.com"),
            Err(ConsolidatorError::InvalidBaseUrl(_))
        ));
    }
}

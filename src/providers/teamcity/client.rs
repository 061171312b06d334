use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{ChainLensError, Result};

const MAX_RETRIES: u32 = 30;
const RETRY_DELAY_SECONDS: u64 = 10;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;

/// REST client for one TeamCity server.
pub struct TeamCityClient {
    client: Client,
    base_url: Url,
    token: Option<Token>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    retry_delay: Duration,
}

impl TeamCityClient {
    pub fn new(base_url: &str, token: Option<Token>, max_concurrent_requests: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ChainLens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChainLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| ChainLensError::Config(format!("Invalid base URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    /// Overrides the retry budget (tests use a zero delay).
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Resolves a server-relative path such as `/app/rest/latest/builds/id:1`.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ChainLensError::Config(format!("Invalid URL path {path}: {e}")))
    }

    /// GET returning parsed JSON, `None` when the server answers 404.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ChainLensError::Config(format!("Request limiter closed: {e}")))?;

        match self.send_with_retry(path, query, "application/json").await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    /// GET returning the body as text, `None` when the server answers 404.
    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<Option<String>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ChainLensError::Config(format!("Request limiter closed: {e}")))?;

        match self.send_with_retry(path, query, "text/plain").await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    /// Sends a GET with automatic retry on network errors, rate limits and
    /// server errors.
    async fn send_with_retry(
        &self,
        path: &str,
        query: &[(&str, String)],
        accept: &str,
    ) -> Result<Option<Response>> {
        let url = self.url(path)?;

        let mut retry_count = 0;
        loop {
            let request = self.auth_request(
                self.client
                    .get(url.clone())
                    .query(query)
                    .header(ACCEPT, accept),
            );

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= self.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                debug!("Not found: {url}");
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(ChainLensError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.max_retries,
                    });
                }

                warn!(
                    "TeamCity API error (status {status}). Waiting {} seconds before retry {}/{}...",
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                    self.max_retries
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(ChainLensError::Api {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(Some(response));
        }
    }
}

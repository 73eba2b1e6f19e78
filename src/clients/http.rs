//! Shared request plumbing for all upstream adapters.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::limiter::ConcurrencyCap;
use super::{Upstream, UpstreamError};

/// Maximum characters of an error body kept in `UpstreamError::Status`.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Bounded retry with linear backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// HTTP client bound to one upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    service: Upstream,
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
    cap: ConcurrencyCap,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        cap: ConcurrencyCap,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("medsafe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            service: cap.service(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: timeout.as_secs(),
            cap,
            retry,
        })
    }

    pub fn service(&self) -> Upstream {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base}{path}?{query}` decoded as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(|| self.client.get(&url).query(query)).await
    }

    /// `POST {base}{path}` with a JSON body, decoded as JSON.
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(|| self.client.post(&url).json(body)).await
    }

    async fn execute<T, F>(&self, build: F) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let _permit = self.cap.acquire().await?;
                self.attempt::<T>(build()).await
            };

            match result {
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        service = %self.service,
                        attempt,
                        error = %err,
                        "Retrying upstream request"
                    );
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                }
                other => return other,
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound {
                service: self.service,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                service: self.service,
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Malformed {
            service: self.service,
            detail: e.to_string(),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout {
                service: self.service,
                secs: self.timeout_secs,
            }
        } else if e.is_decode() {
            UpstreamError::Malformed {
                service: self.service,
                detail: e.to_string(),
            }
        } else {
            UpstreamError::NotReachable {
                service: self.service,
                detail: e.to_string(),
            }
        }
    }
}

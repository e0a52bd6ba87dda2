//! FHIR R4 search client
//!
//! Wraps the HTTP layer with bearer-token injection, status-code mapping,
//! and retry with backoff. Auth rejections trigger a token rotation and a
//! single replay before the failure is surfaced.

use crate::adapters::fhir::auth::TokenManager;
use crate::adapters::fhir::models::{Bundle, ResourcePage};
use crate::config::{ApiConfig, AuthConfig};
use crate::core::retry::{retry_request, RetryPolicy};
use crate::domain::{FhirError, MeridianError, Result};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Client for paged FHIR searches
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    retry: RetryPolicy,
}

impl FhirClient {
    /// Builds a client from the API and auth configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(api: &ApiConfig, auth: AuthConfig) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(api.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MeridianError::Configuration(format!("HTTP client build failed: {e}")))?;

        let retry = RetryPolicy::with_max_attempts(api.max_retries);
        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            auth,
            api.token_rotation_count,
            retry.clone(),
        ));

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            tokens,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs a search against a resource type and returns the first page.
    ///
    /// Follow subsequent pages through [`ResourcePage::next_url`] and
    /// [`fetch_url`](FhirClient::fetch_url).
    ///
    /// # Errors
    ///
    /// Returns an error once retries are exhausted or on a non-retryable
    /// response.
    pub async fn search(
        &self,
        resource_type: &str,
        params: &[(&str, String)],
    ) -> Result<ResourcePage> {
        let mut url = url::Url::parse(&format!("{}/{resource_type}", self.base_url))
            .map_err(|e| MeridianError::Fhir(FhirError::InvalidResponse(e.to_string())))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        self.fetch_url(url.as_str()).await
    }

    /// Fetches one page of search results from an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns an error once retries are exhausted or on a non-retryable
    /// response.
    pub async fn fetch_url(&self, url: &str) -> Result<ResourcePage> {
        let bundle = retry_request(&self.retry, "fhir_search", || self.execute(url)).await?;
        Ok(ResourcePage::from_bundle(bundle))
    }

    /// One request attempt, with a single token-rotation replay on 401/403.
    async fn execute(&self, url: &str) -> Result<Bundle> {
        // The generation identifies the token actually sent, including one
        // freshly rotated inside bearer(), so the rejected token itself is
        // invalidated rather than any predecessor.
        let (token, generation) = self.tokens.bearer().await?;

        match self.send(url, &token).await {
            Err(MeridianError::Fhir(FhirError::AuthenticationRejected { status })) => {
                tracing::warn!(
                    status = status,
                    generation = generation,
                    "Bearer token rejected, rotating and replaying once"
                );
                let fresh = self.tokens.invalidate(generation).await?;
                self.send(url, &fresh).await
            }
            other => other,
        }
    }

    async fn send(&self, url: &str, token: &str) -> Result<Bundle> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/fhir+json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MeridianError::Fhir(FhirError::Timeout(e.to_string()))
                } else {
                    MeridianError::Fhir(FhirError::ConnectionFailed(e.to_string()))
                }
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => response
                .json::<Bundle>()
                .await
                .map_err(|e| MeridianError::Fhir(FhirError::InvalidResponse(e.to_string()))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MeridianError::Fhir(
                FhirError::AuthenticationRejected {
                    status: status.as_u16(),
                },
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(MeridianError::Fhir(FhirError::RateLimited { retry_after }))
            }
            s if s.is_server_error() => {
                let message = response.text().await.unwrap_or_default();
                Err(MeridianError::Fhir(FhirError::ServerError {
                    status: s.as_u16(),
                    message,
                }))
            }
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(MeridianError::Fhir(FhirError::ClientError {
                    status: s.as_u16(),
                    message,
                }))
            }
        }
    }
}

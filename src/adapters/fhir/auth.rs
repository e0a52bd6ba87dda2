//! OAuth2 token lifecycle
//!
//! Bearer tokens are obtained with the agency credential grant and rotated
//! after a configured number of uses. Rotation is serialized so concurrent
//! workers hitting the limit at the same time trigger a single token fetch.

use crate::adapters::fhir::models::TokenResponse;
use crate::config::AuthConfig;
use crate::core::retry::{retry_request, RetryPolicy};
use crate::domain::{FhirError, MeridianError, Result};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// A bearer token plus its bookkeeping
struct TokenState {
    value: String,
    generation: u64,
    uses: AtomicU64,
}

/// Manages acquisition and rotation of API bearer tokens
///
/// Each call to [`bearer`](TokenManager::bearer) counts as one use of the
/// current token. Once a token has been handed out `rotation_count` times
/// the next call fetches a fresh one. Callers that observe an auth
/// rejection can force a rotation with
/// [`invalidate`](TokenManager::invalidate).
pub struct TokenManager {
    http: reqwest::Client,
    auth: AuthConfig,
    rotation_count: u64,
    retry: RetryPolicy,
    state: RwLock<Option<Arc<TokenState>>>,
    // Serializes token fetches. Generation numbers let waiters detect
    // that another task already rotated while they were queued.
    rotate_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        auth: AuthConfig,
        rotation_count: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            auth,
            rotation_count,
            retry,
            state: RwLock::new(None),
            rotate_lock: Mutex::new(()),
        }
    }

    /// Returns a bearer token value and its generation, rotating first if
    /// the current token has reached its use limit or no token exists yet.
    ///
    /// The generation identifies the exact token handed out, so a caller
    /// that sees an auth rejection can pass it to
    /// [`invalidate`](TokenManager::invalidate) without racing other
    /// rotations.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the credentials or
    /// stays unreachable through the retry schedule.
    pub async fn bearer(&self) -> Result<(String, u64)> {
        {
            let guard = self.state.read().await;
            if let Some(state) = guard.as_ref() {
                let prior_uses = state.uses.fetch_add(1, Ordering::SeqCst);
                if prior_uses < self.rotation_count {
                    return Ok((state.value.clone(), state.generation));
                }
                // Limit reached. Fall through to rotate; the incremented
                // count keeps other readers falling through too.
                let generation = state.generation;
                drop(guard);
                return self.rotate(Some(generation)).await;
            }
        }
        self.rotate(None).await
    }

    /// Discards the token of the given generation and fetches a fresh one.
    ///
    /// Pass the generation observed when the rejected request was made so
    /// that a token already replaced by another task is not rotated twice.
    pub async fn invalidate(&self, generation: u64) -> Result<String> {
        Ok(self.rotate(Some(generation)).await?.0)
    }

    /// The generation number of the current token, or 0 before the first
    /// fetch. Used by callers to correlate auth failures with the token
    /// that produced them.
    pub async fn current_generation(&self) -> u64 {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.generation)
            .unwrap_or(0)
    }

    async fn rotate(&self, stale_generation: Option<u64>) -> Result<(String, u64)> {
        let _permit = self.rotate_lock.lock().await;

        // Another task may have already rotated while we waited.
        {
            let guard = self.state.read().await;
            if let Some(state) = guard.as_ref() {
                let already_rotated = match stale_generation {
                    Some(stale) => state.generation > stale,
                    None => true,
                };
                if already_rotated {
                    state.uses.fetch_add(1, Ordering::SeqCst);
                    return Ok((state.value.clone(), state.generation));
                }
            }
        }

        let next_generation = self.current_generation().await + 1;
        // Transient endpoint failures get the same backoff schedule as
        // resource requests. Only a credential rejection is fatal here.
        let token = retry_request(&self.retry, "token_issuance", || self.fetch_token())
            .await
            .map_err(|e| match e {
                MeridianError::Authentication(_) => e,
                other => MeridianError::Authentication(format!("Token issuance failed: {other}")),
            })?;

        tracing::info!(
            generation = next_generation,
            rotation_count = self.rotation_count,
            "Rotated API bearer token"
        );

        let state = Arc::new(TokenState {
            value: token.clone(),
            generation: next_generation,
            uses: AtomicU64::new(1),
        });
        *self.state.write().await = Some(state);

        Ok((token, next_generation))
    }

    async fn fetch_token(&self) -> Result<String> {
        let params = [
            ("grant_type", "agency_auth"),
            ("client_id", self.auth.client_id.as_str()),
            ("scope", self.auth.scope.as_str()),
            (
                "resource_security_id",
                self.auth.resource_security_id.expose_secret().as_ref(),
            ),
            (
                "agency_secret",
                self.auth.agency_secret.expose_secret().as_ref(),
            ),
        ];

        let response = self
            .http
            .post(&self.auth.token_url)
            .form(&params)
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
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(MeridianError::Fhir(FhirError::RateLimited { retry_after }));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(MeridianError::Fhir(FhirError::ServerError {
                status: status.as_u16(),
                message: body,
            }));
        }
        if !status.is_success() {
            // A 4xx from the token endpoint means the credentials were
            // rejected. No amount of retrying fixes that.
            let body = response.text().await.unwrap_or_default();
            return Err(MeridianError::Authentication(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            MeridianError::Authentication(format!("Invalid token response: {e}"))
        })?;

        if token.access_token.is_empty() {
            return Err(MeridianError::Authentication(
                "Token response contained an empty access_token".to_string(),
            ));
        }

        Ok(token.access_token)
    }
}

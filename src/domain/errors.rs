//! Domain error types
//!
//! This module defines the error hierarchy for Meridian. All errors are
//! domain-specific and don't expose third-party types.

use std::time::Duration;
use thiserror::Error;

/// Main Meridian error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Configuration-related errors, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// FHIR API errors
    #[error("FHIR error: {0}")]
    Fhir(#[from] FhirError),

    /// Authentication errors (token issuance exhausted its retries)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Export record schema drift, fatal to the affected job only
    #[error("Schema mismatch for {domain}: expected columns {expected}, got {actual}")]
    SchemaMismatch {
        domain: String,
        expected: String,
        actual: String,
    },

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// Job was cancelled by a shutdown signal
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl MeridianError {
    /// Whether a retry with backoff may resolve this error.
    ///
    /// Only FHIR transport failures are ever retryable; everything else
    /// (config, export, serialization) is deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            MeridianError::Fhir(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Server-supplied delay hint, honored before the next retry attempt.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            MeridianError::Fhir(e) => e.retry_hint(),
            _ => None,
        }
    }
}

/// FHIR API-specific errors
///
/// Errors that occur when talking to the remote FHIR endpoint. These don't
/// expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum FhirError {
    /// Failed to reach the FHIR endpoint
    #[error("Failed to connect to FHIR endpoint: {0}")]
    ConnectionFailed(String),

    /// Request exceeded the configured timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Rate limit exceeded (429), optionally carrying the server's retry hint
    #[error("Rate limit exceeded{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Token rejected by the server (401/403)
    #[error("Authentication rejected with status {status}")]
    AuthenticationRejected { status: u16 },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 401/403/429), never retried
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Response body was not a valid bundle or token payload
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

impl FhirError {
    /// Whether a retry with backoff may resolve this error.
    ///
    /// Network failures, timeouts, rate limits, and 5xx responses are
    /// transient. 401/403 is handled separately through token rotation, and
    /// other 4xx responses are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FhirError::ConnectionFailed(_)
                | FhirError::Timeout(_)
                | FhirError::RateLimited { .. }
                | FhirError::ServerError { .. }
        )
    }

    /// Server-supplied delay hint, honored before the next retry attempt.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            FhirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for MeridianError {
    fn from(err: std::io::Error) -> Self {
        MeridianError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for MeridianError {
    fn from(err: serde_json::Error) -> Self {
        MeridianError::Serialization(err.to_string())
    }
}

// Conversion from csv::Error
impl From<csv::Error> for MeridianError {
    fn from(err: csv::Error) -> Self {
        MeridianError::Export(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for MeridianError {
    fn from(err: toml::de::Error) -> Self {
        MeridianError::Configuration(format!("TOML parse error: {err}"))
    }
}

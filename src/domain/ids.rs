//! Job identifiers
//!
//! FHIR resource ids stay plain strings in the flattened records; the only
//! identifier with behavior of its own is the per-run job ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job identifier for one extraction run
///
/// A fresh JobId is minted per run; terminal jobs are never reused, so a
/// retry of a failed extraction is always a new job with a new ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Mints a new unique job ID for the given domain name.
    pub fn generate(domain: &str) -> Self {
        Self(format!("{}-{}", domain, uuid::Uuid::new_v4()))
    }

    /// Creates a JobId from an existing string (used by tests and observers)
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Job ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the job ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

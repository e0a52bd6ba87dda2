//! Bundle page traversal
//!
//! Walks a search forward through its `next` links. The walker is lazy
//! and single-use; once a page fails or the links run out it stays
//! exhausted.

use crate::adapters::fhir::client::FhirClient;
use crate::adapters::fhir::models::ResourcePage;
use crate::domain::Result;
use std::sync::Arc;

/// Cursor over the pages of one FHIR search
pub struct PageWalker {
    client: Arc<FhirClient>,
    resource_type: String,
    params: Vec<(String, String)>,
    next_url: Option<String>,
    started: bool,
    exhausted: bool,
}

impl PageWalker {
    pub fn new(
        client: Arc<FhirClient>,
        resource_type: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            client,
            resource_type: resource_type.into(),
            params,
            next_url: None,
            started: false,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once the search is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the page fetch error and marks the walker exhausted, so a
    /// failed search is never silently resumed mid-way.
    pub async fn next_page(&mut self) -> Result<Option<ResourcePage>> {
        if self.exhausted {
            return Ok(None);
        }

        let result = if !self.started {
            self.started = true;
            let params: Vec<(&str, String)> = self
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect();
            self.client.search(&self.resource_type, &params).await
        } else {
            match self.next_url.take() {
                Some(url) => self.client.fetch_url(&url).await,
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        };

        match result {
            Ok(page) => {
                self.next_url = page.next_url.clone();
                if self.next_url.is_none() {
                    self.exhausted = true;
                }
                Ok(Some(page))
            }
            Err(e) => {
                self.exhausted = true;
                Err(e)
            }
        }
    }

    /// Collects every remaining resource across all pages.
    ///
    /// # Errors
    ///
    /// Returns the first page fetch error encountered.
    pub async fn collect_all(mut self) -> Result<Vec<serde_json::Value>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page.resources);
        }
        Ok(all)
    }
}

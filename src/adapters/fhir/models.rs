//! FHIR R4 wire models
//!
//! Minimal serde models for the portions of the FHIR R4 payloads the
//! extraction jobs consume. Resources themselves are kept as raw JSON
//! values so each job can pull out only the fields it needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A FHIR searchset bundle
///
/// Search responses arrive as a `Bundle` containing zero or more entries
/// and a set of paging links. The `next` link, when present, points to
/// the next page of the same search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(rename = "type", default)]
    pub bundle_type: Option<String>,

    /// Server-reported total match count, when the server provides one
    #[serde(default)]
    pub total: Option<u64>,

    #[serde(default)]
    pub link: Vec<BundleLink>,

    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    /// The URL of the next page, if the server advertised one.
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url.as_str())
    }

    /// Extracts the resources from all entries, discarding entries
    /// without a resource body.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entry.iter().filter_map(|e| e.resource.as_ref())
    }

    /// Consumes the bundle and returns its resources.
    pub fn into_resources(self) -> Vec<Value> {
        self.entry.into_iter().filter_map(|e| e.resource).collect()
    }
}

/// A paging or self link in a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// A single bundle entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", default)]
    pub full_url: Option<String>,

    #[serde(default)]
    pub resource: Option<Value>,
}

/// OAuth2 token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    /// Token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// One page of search results returned to callers
///
/// Bundles are unwrapped into raw resources at the adapter boundary so
/// jobs never deal with bundle plumbing directly.
#[derive(Debug, Clone)]
pub struct ResourcePage {
    /// Raw resources from this page
    pub resources: Vec<Value>,

    /// URL of the next page, if any
    pub next_url: Option<String>,

    /// Server-reported total for the whole search, when known
    pub total: Option<u64>,
}

impl ResourcePage {
    /// Builds a page from a parsed bundle.
    pub fn from_bundle(bundle: Bundle) -> Self {
        let next_url = bundle.next_link().map(str::to_string);
        let total = bundle.total;
        Self {
            resources: bundle.into_resources(),
            next_url,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn searchset(entries: usize, with_next: bool) -> Bundle {
        let mut links = vec![json!({"relation": "self", "url": "https://api.example.com/Patient"})];
        if with_next {
            links.push(json!({
                "relation": "next",
                "url": "https://api.example.com/Patient?page=2"
            }));
        }
        let entry: Vec<_> = (0..entries)
            .map(|i| {
                json!({
                    "fullUrl": format!("https://api.example.com/Patient/{i}"),
                    "resource": {"resourceType": "Patient", "id": i.to_string()}
                })
            })
            .collect();
        serde_json::from_value(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "total": entries,
            "link": links,
            "entry": entry,
        }))
        .unwrap()
    }

    #[test]
    fn test_next_link_present() {
        let bundle = searchset(2, true);
        assert_eq!(
            bundle.next_link(),
            Some("https://api.example.com/Patient?page=2")
        );
    }

    #[test]
    fn test_next_link_absent() {
        let bundle = searchset(2, false);
        assert!(bundle.next_link().is_none());
    }

    #[test]
    fn test_resources_skip_empty_entries() {
        let bundle: Bundle = serde_json::from_value(json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "1"}},
                {"fullUrl": "https://api.example.com/Patient/2"}
            ]
        }))
        .unwrap();
        assert_eq!(bundle.resources().count(), 1);
    }

    #[test]
    fn test_empty_bundle_deserializes() {
        let bundle: Bundle =
            serde_json::from_value(json!({"resourceType": "Bundle"})).unwrap();
        assert!(bundle.entry.is_empty());
        assert!(bundle.link.is_empty());
        assert!(bundle.total.is_none());
    }

    #[test]
    fn test_page_from_bundle() {
        let page = ResourcePage::from_bundle(searchset(3, true));
        assert_eq!(page.resources.len(), 3);
        assert_eq!(page.total, Some(3));
        assert!(page.next_url.is_some());
    }

    #[test]
    fn test_token_response_deserializes() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token": "abc", "token_type": "Bearer", "expires_in": 3600}"#,
        )
        .unwrap();
        assert_eq!(resp.access_token, "abc");
        assert_eq!(resp.expires_in, Some(3600));
    }
}

//! FHIR R4 API adapter
//!
//! Token lifecycle, paged searches, and the wire models the extraction
//! jobs consume.

pub mod auth;
pub mod client;
pub mod models;
pub mod pages;

pub use auth::TokenManager;
pub use client::FhirClient;
pub use models::{Bundle, BundleEntry, BundleLink, ResourcePage, TokenResponse};
pub use pages::PageWalker;

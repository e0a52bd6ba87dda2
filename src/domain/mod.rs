//! Domain models and types for Meridian.
//!
//! This module contains the core domain models, types, and business rules.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Run identifiers** ([`JobId`])
//! - **Export record variants** ([`ExportRecord`], [`ExportDomain`])
//! - **Error types** ([`MeridianError`], [`FhirError`])
//! - **Result type alias** ([`Result`])

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{FhirError, MeridianError};
pub use ids::JobId;
pub use record::{
    AlertRecord, AppointmentRecord, ExportDomain, ExportRecord, NoteRecord, PatientRecord,
    WorkerRecord,
};
pub use result::Result;

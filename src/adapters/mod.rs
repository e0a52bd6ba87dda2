//! External system adapters
//!
//! Everything that talks to the outside world lives here: the FHIR API
//! client with its token lifecycle, and the export handoff targets.

pub mod fhir;
pub mod sharepoint;

// Meridian - FHIR Data Extraction Tool
// Copyright (c) 2026 Meridian Contributors
// Licensed under the MIT License

//! # Meridian - FHIR Data Extraction
//!
//! Meridian is a command-line tool that extracts operational data from a
//! FHIR R4 API and writes it to flat CSV exports for downstream reporting.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Authenticating** against an OAuth2 token endpoint with use-count
//!   based token rotation
//! - **Fetching** FHIR resources with retries, backoff, and bundle
//!   pagination
//! - **Extracting** five domains in parallel batches: patients, notes,
//!   appointments, workers, and alerts
//! - **Writing** schema-validated CSV exports with atomic finalization
//!
//! ## Architecture
//!
//! Meridian follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (jobs, orchestration, progress, export)
//! - [`adapters`] - External integrations (FHIR API, export handoff)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meridian::adapters::fhir::FhirClient;
//! use meridian::config::load_config;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(Path::new("meridian.toml"))?;
//! let client = FhirClient::new(&config.api, config.auth.clone())?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

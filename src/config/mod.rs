//! Configuration management
//!
//! Loads settings from a TOML file with environment variable substitution
//! and flat environment overrides. Credentials are wrapped in secret types
//! that redact on Debug and zeroize on drop.

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApiConfig, ApplicationConfig, AuthConfig, ExtractConfig, LoggingConfig, MeridianConfig,
    OutputConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};

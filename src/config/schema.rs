//! Configuration schema types
//!
//! This module defines the configuration structure for Meridian.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main Meridian configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeridianConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// OAuth2 credential settings
    pub auth: AuthConfig,

    /// FHIR API settings
    pub api: ApiConfig,

    /// Extraction tuning
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Output files and directories
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeridianConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.auth.validate()?;
        self.api.validate()?;
        self.extract.validate()?;
        self.output.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// OAuth2 client-credentials configuration
///
/// The agency credentials are exchanged for short-lived bearer tokens at the
/// token endpoint. Both secret fields are zeroized on drop and redacted in
/// Debug output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth2 client identifier
    pub client_id: String,

    /// Resource security identifier issued by the API vendor
    pub resource_security_id: SecretString,

    /// Agency secret issued by the API vendor
    pub agency_secret: SecretString,

    /// Token endpoint URL
    pub token_url: String,

    /// OAuth2 scope string sent with the token request
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.client_id.is_empty() {
            return Err("auth.client_id cannot be empty".to_string());
        }
        if self.resource_security_id.expose_secret().is_empty() {
            return Err("auth.resource_security_id cannot be empty".to_string());
        }
        if self.agency_secret.expose_secret().is_empty() {
            return Err("auth.agency_secret cannot be empty".to_string());
        }
        if !self.token_url.starts_with("http://") && !self.token_url.starts_with("https://") {
            return Err("auth.token_url must start with http:// or https://".to_string());
        }
        Ok(())
    }
}

/// FHIR API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the FHIR R4 endpoint
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Number of successful requests before the bearer token is rotated
    #[serde(default = "default_token_rotation_count")]
    pub token_rotation_count: u64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl ApiConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("api.base_url must start with http:// or https://".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("api.request_timeout_secs must be greater than 0".to_string());
        }
        if self.token_rotation_count == 0 {
            return Err("api.token_rotation_count must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Extraction tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Page size for most resource searches
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Size of the concurrent worker pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Page size for patient roster searches
    #[serde(default = "default_patient_batch_size")]
    pub patient_batch_size: usize,

    /// Batch size for encounter/location lookups
    #[serde(default = "default_encounter_batch_size")]
    pub encounter_batch_size: usize,

    /// Worker roster is filtered to these branch names
    #[serde(default)]
    pub target_branches: Vec<String>,

    /// How far back the coordination-notes window reaches on a first run
    #[serde(default = "default_notes_window_days")]
    pub notes_window_days: i64,

    /// Appointment service code filter for the weekly schedule
    #[serde(default = "default_service_code")]
    pub appointment_service_code: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            patient_batch_size: default_patient_batch_size(),
            encounter_batch_size: default_encounter_batch_size(),
            target_branches: Vec::new(),
            notes_window_days: default_notes_window_days(),
            appointment_service_code: default_service_code(),
        }
    }
}

impl ExtractConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("extract.batch_size must be greater than 0".to_string());
        }
        if self.max_workers == 0 {
            return Err("extract.max_workers must be greater than 0".to_string());
        }
        if self.patient_batch_size == 0 {
            return Err("extract.patient_batch_size must be greater than 0".to_string());
        }
        if self.encounter_batch_size == 0 {
            return Err("extract.encounter_batch_size must be greater than 0".to_string());
        }
        if self.notes_window_days <= 0 {
            return Err("extract.notes_window_days must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for finalized CSV exports and progress sidecars
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Patient demographics export filename
    #[serde(default = "default_patients_filename")]
    pub patients_filename: String,

    /// Weekly appointments export filename
    #[serde(default = "default_appointments_filename")]
    pub appointments_filename: String,

    /// Coordination notes export filename
    #[serde(default = "default_notes_filename")]
    pub notes_filename: String,

    /// Worker roster export filename
    #[serde(default = "default_workers_filename")]
    pub workers_filename: String,

    /// Alert roster export filename
    #[serde(default = "default_alerts_filename")]
    pub alerts_filename: String,

    /// Optional drop directory finalized files are copied into
    /// (the handoff point for the external uploader)
    #[serde(default)]
    pub drop_directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            patients_filename: default_patients_filename(),
            appointments_filename: default_appointments_filename(),
            notes_filename: default_notes_filename(),
            workers_filename: default_workers_filename(),
            alerts_filename: default_alerts_filename(),
            drop_directory: None,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<(), String> {
        for (field, name) in [
            (&self.patients_filename, "output.patients_filename"),
            (&self.appointments_filename, "output.appointments_filename"),
            (&self.notes_filename, "output.notes_filename"),
            (&self.workers_filename, "output.workers_filename"),
            (&self.alerts_filename, "output.alerts_filename"),
        ] {
            if field.is_empty() {
                return Err(format!("{name} cannot be empty"));
            }
        }
        Ok(())
    }

    /// The configured filename for a given domain.
    pub fn filename_for(&self, domain: crate::domain::ExportDomain) -> &str {
        use crate::domain::ExportDomain;
        match domain {
            ExportDomain::Patients => &self.patients_filename,
            ExportDomain::Appointments => &self.appointments_filename,
            ExportDomain::Notes => &self.notes_filename,
            ExportDomain::Workers => &self.workers_filename,
            ExportDomain::Alerts => &self.alerts_filename,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for local log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation policy for local log files (daily or hourly)
    #[serde(default = "default_log_rotation")]
    pub local_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_log_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".into());
        }
        match self.local_rotation.as_str() {
            "daily" | "hourly" => Ok(()),
            other => Err(format!(
                "Invalid logging.local_rotation '{other}'. Must be 'daily' or 'hourly'"
            )),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scope() -> String {
    "openid agency.identity".to_string()
}

fn default_request_timeout() -> u64 {
    45
}

fn default_token_rotation_count() -> u64 {
    200
}

fn default_max_retries() -> usize {
    3
}

fn default_batch_size() -> usize {
    100
}

fn default_max_workers() -> usize {
    5
}

fn default_patient_batch_size() -> usize {
    1000
}

fn default_encounter_batch_size() -> usize {
    100
}

fn default_notes_window_days() -> i64 {
    60
}

fn default_service_code() -> String {
    "SN11".to_string()
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_patients_filename() -> String {
    "patient_data.csv".to_string()
}

fn default_appointments_filename() -> String {
    "weekly_appointments.csv".to_string()
}

fn default_notes_filename() -> String {
    "coordination_notes_master.csv".to_string()
}

fn default_workers_filename() -> String {
    "worker_data.csv".to_string()
}

fn default_alerts_filename() -> String {
    "alert_roster.csv".to_string()
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use crate::domain::ExportDomain;

    fn valid_config() -> MeridianConfig {
        MeridianConfig {
            application: ApplicationConfig::default(),
            auth: AuthConfig {
                client_id: "client-1".to_string(),
                resource_security_id: secret_string("rsid".to_string()),
                agency_secret: secret_string("secret".to_string()),
                token_url: "https://idp.example.com/connect/token".to_string(),
                scope: default_scope(),
            },
            api: ApiConfig {
                base_url: "https://api.example.com/fhir/r4".to_string(),
                request_timeout_secs: 45,
                token_rotation_count: 200,
                max_retries: 3,
            },
            extract: ExtractConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let extract = ExtractConfig::default();
        assert_eq!(extract.batch_size, 100);
        assert_eq!(extract.max_workers, 5);
        assert_eq!(extract.patient_batch_size, 1000);
        assert_eq!(extract.encounter_batch_size, 100);

        assert_eq!(default_request_timeout(), 45);
        assert_eq!(default_token_rotation_count(), 200);
        assert_eq!(default_max_retries(), 3);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = valid_config();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let mut config = valid_config();
        config.auth.client_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_token_url_rejected() {
        let mut config = valid_config();
        config.auth.token_url = "ftp://idp.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.extract.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filename_for_domain() {
        let output = OutputConfig::default();
        assert_eq!(output.filename_for(ExportDomain::Patients), "patient_data.csv");
        assert_eq!(
            output.filename_for(ExportDomain::Appointments),
            "weekly_appointments.csv"
        );
        assert_eq!(output.filename_for(ExportDomain::Workers), "worker_data.csv");
    }
}

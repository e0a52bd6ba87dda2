//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "meridian.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Meridian configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        match fs::write(&self.output, Self::generate_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - Set CLIENT_ID, RESOURCE_SECURITY_ID, and AGENCY_SECRET");
                println!("     - Set TOKEN_URL and API_BASE_URL");
                println!("  3. Validate configuration: meridian validate-config");
                println!("  4. Run an extraction: meridian extract");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate sample configuration
    fn generate_config() -> String {
        r#"# Meridian Configuration File
# FHIR R4 data extraction tool

[application]
log_level = "info"

[auth]
client_id = "${CLIENT_ID}"
resource_security_id = "${RESOURCE_SECURITY_ID}"
agency_secret = "${AGENCY_SECRET}"
token_url = "${TOKEN_URL}"
scope = "openid agency.identity"

[api]
base_url = "${API_BASE_URL}"
request_timeout_secs = 45
token_rotation_count = 200
max_retries = 3

[extract]
batch_size = 100
max_workers = 5
patient_batch_size = 1000
encounter_batch_size = 100
# Leave empty to keep workers from every branch
target_branches = []
notes_window_days = 60
appointment_service_code = "SN11"

[output]
directory = "output"
patients_filename = "patient_data.csv"
appointments_filename = "weekly_appointments.csv"
notes_filename = "coordination_notes_master.csv"
workers_filename = "worker_data.csv"
alerts_filename = "alert_roster.csv"
# Uncomment to copy finalized exports into a watched drop directory
# drop_directory = "/mnt/sync/drop"

[logging]
local_enabled = false
local_path = "logs"
local_rotation = "daily"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_config_parses() {
        let content = InitArgs::generate_config();
        let parsed: toml::Value = toml::from_str(&content).unwrap();
        assert!(parsed.get("auth").is_some());
        assert!(parsed.get("extract").is_some());
        assert!(parsed.get("output").is_some());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meridian.toml");
        fs::write(&path, "existing").unwrap();

        let args = InitArgs {
            output: path.to_string_lossy().to_string(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing");
    }

    #[tokio::test]
    async fn test_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meridian.toml");

        let args = InitArgs {
            output: path.to_string_lossy().to_string(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(path.exists());
    }
}

//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Meridian configuration file.

use crate::config::load_config;
use clap::Args;
use std::path::Path;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config substitutes env vars, applies overrides, and validates
        let config = match load_config(Path::new(config_path)) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Token URL: {}", config.auth.token_url);
        println!("  API Base URL: {}", config.api.base_url);
        println!("  Request Timeout: {}s", config.api.request_timeout_secs);
        println!("  Token Rotation Count: {}", config.api.token_rotation_count);
        println!("  Max Retries: {}", config.api.max_retries);
        println!("  Batch Size: {}", config.extract.batch_size);
        println!("  Max Workers: {}", config.extract.max_workers);
        println!(
            "  Target Branches: {}",
            if config.extract.target_branches.is_empty() {
                "All".to_string()
            } else {
                format!("{:?}", config.extract.target_branches)
            }
        );
        println!("  Output Directory: {}", config.output.directory.display());
        if let Some(drop_dir) = &config.output.drop_directory {
            println!("  Drop Directory: {}", drop_dir.display());
        }
        println!();
        Ok(0)
    }
}

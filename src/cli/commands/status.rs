//! Status command implementation
//!
//! This module implements the `status` command, which reads the progress
//! sidecar files and displays recent job history.

use crate::config::load_config;
use crate::core::progress::ProgressTracker;
use clap::Args;
use std::path::Path;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by domain (patients, notes, appointments, workers, alerts)
    #[arg(long)]
    pub domain: Option<String>,

    /// Maximum number of jobs to display
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking job status");

        println!("📊 Job Status");
        println!();

        let config = match load_config(Path::new(config_path)) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let tracker = match ProgressTracker::new(&config.output.directory) {
            Ok(t) => t,
            Err(e) => {
                println!("❌ Failed to open progress directory");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let snapshots = match tracker.load_all() {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to load job history");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let filtered: Vec<_> = snapshots
            .iter()
            .filter(|s| {
                self.domain
                    .as_ref()
                    .map_or(true, |d| s.domain.name() == d.to_lowercase())
            })
            .take(self.limit)
            .collect();

        if filtered.is_empty() {
            println!("No job history found.");
            println!("Run 'meridian extract' to start extracting data.");
            return Ok(0);
        }

        println!("Found {} job(s):", filtered.len());
        println!();
        println!(
            "{:<14} {:<17} {:>10} {:>8} {:>8} {:<20}",
            "Domain", "Status", "Completed", "Failed", "Total", "Started"
        );
        println!("{}", "-".repeat(82));

        for snapshot in filtered {
            println!(
                "{:<14} {:<17} {:>10} {:>8} {:>8} {:<20}",
                snapshot.domain.name(),
                snapshot.status.to_string(),
                snapshot.completed,
                snapshot.failed,
                snapshot.total_known,
                snapshot.started_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }

        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs {
            domain: None,
            limit: 20,
        };
        assert!(args.domain.is_none());
        assert_eq!(args.limit, 20);
    }
}

//! Extract command implementation
//!
//! This module implements the `extract` command, which runs one or all
//! extraction domains and writes their CSV exports.

use crate::adapters::fhir::FhirClient;
use crate::adapters::sharepoint::{LocalDropTarget, UploadTarget};
use crate::config::load_config;
use crate::core::export::RunSummary;
use crate::core::jobs::{run_job, JobContext};
use crate::core::progress::ProgressTracker;
use crate::domain::ExportDomain;
use clap::Args;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the extract command
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Run a single domain (patients, notes, appointments, workers, alerts).
    /// Runs all domains when omitted.
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Skip drop-directory delivery even when configured
    #[arg(long)]
    pub no_deliver: bool,
}

impl ExtractArgs {
    /// Execute the extract command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting extract command");

        let config = match load_config(Path::new(config_path)) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Configuration error");
                eprintln!("Configuration error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let domains: Vec<ExportDomain> = match &self.domain {
            Some(name) => match ExportDomain::from_str(name) {
                Ok(domain) => vec![domain],
                Err(e) => {
                    eprintln!("{e}");
                    return Ok(2);
                }
            },
            None => ExportDomain::ALL.to_vec(),
        };

        let client = match FhirClient::new(&config.api, config.auth.clone()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::error!(error = %e, "Failed to build FHIR client");
                eprintln!("Failed to initialize FHIR client: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let progress = match ProgressTracker::new(&config.output.directory) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare progress directory");
                eprintln!("Failed to prepare output directory: {e}");
                return Ok(5);
            }
        };

        let ctx = JobContext {
            client,
            config: Arc::new(config),
            progress,
            cancel: shutdown_signal,
        };

        println!("🚀 Starting extraction for {} domain(s)", domains.len());
        println!();

        let mut run = RunSummary::default();
        for domain in domains {
            if ctx.cancelled() {
                tracing::warn!(domain = %domain, "Shutdown requested, skipping remaining domains");
                break;
            }

            tracing::info!(domain = %domain, "Running extraction job");
            match run_job(domain, &ctx).await {
                Ok(summary) => run.push(summary),
                Err(e) => {
                    tracing::error!(domain = %domain, error = %e, "Job bookkeeping failed");
                    eprintln!("Fatal error in {domain} job: {e}");
                    return Ok(5);
                }
            }
        }

        if !self.no_deliver {
            if let Some(drop_dir) = &ctx.config.output.drop_directory {
                let target = LocalDropTarget::new(drop_dir.clone());
                deliver_outputs(&target, &run).await;
            }
        }

        println!("{}", run.render());
        Ok(run.exit_code())
    }
}

/// Hands finalized export files to the configured drop target.
///
/// Delivery failures are logged but never change the run's exit code; the
/// local export file is the source of truth.
async fn deliver_outputs(target: &dyn UploadTarget, run: &RunSummary) {
    for job in &run.jobs {
        let Some(file) = &job.output_file else {
            continue;
        };
        match target.deliver(file).await {
            Ok(()) => {
                tracing::info!(file = %file.display(), target = %target.describe(), "Export delivered");
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Export delivery failed");
                eprintln!("Warning: failed to deliver {}: {e}", file.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_args_defaults() {
        let args = ExtractArgs {
            domain: None,
            no_deliver: false,
        };
        assert!(args.domain.is_none());
        assert!(!args.no_deliver);
    }

    #[test]
    fn test_extract_args_with_domain() {
        let args = ExtractArgs {
            domain: Some("workers".to_string()),
            no_deliver: true,
        };
        assert_eq!(args.domain.as_deref(), Some("workers"));
    }
}

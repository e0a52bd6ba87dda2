//! Per-domain extraction jobs
//!
//! Each driver composes the FHIR client, pagination, the worker pool, and
//! the CSV writer into one extraction run. The runner here owns the job
//! lifecycle: progress registration, terminal status, and the summary
//! handed back to the CLI.

pub mod alerts;
pub mod appointments;
mod fields;
pub mod notes;
pub mod patients;
pub mod workers;

use crate::adapters::fhir::FhirClient;
use crate::config::MeridianConfig;
use crate::core::export::JobSummary;
use crate::core::progress::{JobStatus, ProgressTracker};
use crate::domain::{ExportDomain, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Shared dependencies handed to every driver
#[derive(Clone)]
pub struct JobContext {
    pub client: Arc<FhirClient>,
    pub config: Arc<MeridianConfig>,
    pub progress: Arc<ProgressTracker>,
    pub cancel: watch::Receiver<bool>,
}

impl JobContext {
    pub fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// What a driver reports back to the runner
pub struct DriverOutcome {
    pub status: JobStatus,
    pub rows_written: u64,
    pub output_file: Option<PathBuf>,
    pub errors: Vec<String>,
}

/// Runs one domain end to end and returns its summary.
///
/// Driver errors become a `failed` summary rather than aborting the whole
/// run, so sibling domains still execute.
///
/// # Errors
///
/// Returns an error only when progress bookkeeping itself fails.
pub async fn run_job(domain: ExportDomain, ctx: &JobContext) -> Result<JobSummary> {
    let started = Instant::now();
    let progress = ctx.progress.start(domain)?;

    let result = match domain {
        ExportDomain::Patients => patients::run(ctx, &progress).await,
        ExportDomain::Notes => notes::run(ctx, &progress).await,
        ExportDomain::Appointments => appointments::run(ctx, &progress).await,
        ExportDomain::Workers => workers::run(ctx, &progress).await,
        ExportDomain::Alerts => alerts::run(ctx, &progress).await,
    };

    let (status, rows_written, output_file, errors) = match result {
        Ok(outcome) => (
            outcome.status,
            outcome.rows_written,
            outcome.output_file,
            outcome.errors,
        ),
        Err(e) => {
            tracing::error!(domain = %domain, error = %e, "Extraction job failed");
            (JobStatus::Failed, 0, None, vec![e.to_string()])
        }
    };

    ctx.progress.finish(&progress, status)?;
    let snapshot = progress.snapshot();

    Ok(JobSummary {
        domain,
        job_id: progress.id().clone(),
        status,
        rows_written,
        completed: snapshot.completed,
        failed: snapshot.failed,
        duration: started.elapsed(),
        output_file,
        errors,
    })
}

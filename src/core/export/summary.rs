//! Run summaries
//!
//! A human-readable wrap-up printed after each run, plus the process exit
//! code derived from the per-job outcomes.

use crate::core::progress::JobStatus;
use crate::domain::{ExportDomain, JobId};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one extraction job
#[derive(Debug)]
pub struct JobSummary {
    pub domain: ExportDomain,
    pub job_id: JobId,
    pub status: JobStatus,
    pub rows_written: u64,
    pub completed: u64,
    pub failed: u64,
    pub duration: Duration,
    pub output_file: Option<PathBuf>,
    pub errors: Vec<String>,
}

/// Outcome of an entire run, one entry per requested domain
#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn push(&mut self, job: JobSummary) {
        self.jobs.push(job);
    }

    /// Process exit code for this run.
    ///
    /// 0 when every job succeeded, 130 when any job was cancelled,
    /// 1 otherwise (partial or failed jobs).
    pub fn exit_code(&self) -> i32 {
        if self.jobs.iter().any(|j| j.status == JobStatus::Cancelled) {
            130
        } else if self
            .jobs
            .iter()
            .all(|j| j.status == JobStatus::Succeeded)
        {
            0
        } else {
            1
        }
    }

    /// Renders the summary block printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Extraction Summary\n");
        out.push_str("==================\n");

        for job in &self.jobs {
            out.push_str(&format!(
                "{:<14} {:<17} rows={:<8} failed={:<6} {:.1}s\n",
                job.domain.name(),
                job.status.to_string(),
                job.rows_written,
                job.failed,
                job.duration.as_secs_f64(),
            ));
            if let Some(file) = &job.output_file {
                out.push_str(&format!("               -> {}\n", file.display()));
            }
            for error in &job.errors {
                out.push_str(&format!("               !! {error}\n"));
            }
        }

        let total_rows: u64 = self.jobs.iter().map(|j| j.rows_written).sum();
        let total_failed: u64 = self.jobs.iter().map(|j| j.failed).sum();
        out.push_str(&format!(
            "\nTotal: {} rows written, {} items failed across {} job(s)\n",
            total_rows,
            total_failed,
            self.jobs.len()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(domain: ExportDomain, status: JobStatus) -> JobSummary {
        JobSummary {
            domain,
            job_id: JobId::generate(domain.name()),
            status,
            rows_written: 10,
            completed: 10,
            failed: 0,
            duration: Duration::from_secs(2),
            output_file: Some(PathBuf::from("output/patient_data.csv")),
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_exit_code_all_succeeded() {
        let mut run = RunSummary::default();
        run.push(summary(ExportDomain::Patients, JobStatus::Succeeded));
        run.push(summary(ExportDomain::Workers, JobStatus::Succeeded));
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn test_exit_code_partial() {
        let mut run = RunSummary::default();
        run.push(summary(ExportDomain::Patients, JobStatus::Succeeded));
        run.push(summary(ExportDomain::Notes, JobStatus::PartiallyFailed));
        assert_eq!(run.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_cancelled_wins() {
        let mut run = RunSummary::default();
        run.push(summary(ExportDomain::Patients, JobStatus::Failed));
        run.push(summary(ExportDomain::Notes, JobStatus::Cancelled));
        assert_eq!(run.exit_code(), 130);
    }

    #[test]
    fn test_render_includes_totals() {
        let mut run = RunSummary::default();
        run.push(summary(ExportDomain::Patients, JobStatus::Succeeded));
        let text = run.render();
        assert!(text.contains("patients"));
        assert!(text.contains("10"));
        assert!(text.contains("1 job(s)"));
    }
}

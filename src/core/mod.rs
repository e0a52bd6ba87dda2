//! Extraction engine
//!
//! Retry policy, batch orchestration, progress tracking, per-domain job
//! drivers, and the CSV export pipeline.

pub mod export;
pub mod jobs;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use export::{CsvExportWriter, JobSummary, RunSummary};
pub use jobs::{run_job, JobContext};
pub use orchestrator::{partition, run_batches, Batch, PoolOutcome};
pub use progress::{JobProgress, JobStatus, ProgressSnapshot, ProgressTracker};
pub use retry::{retry_request, RetryPolicy};

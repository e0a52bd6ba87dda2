//! Job progress tracking
//!
//! Counters are lock-free atomics shared across workers. Snapshots are
//! persisted as JSON sidecars under `<output>/.progress/` so an operator
//! can inspect a run while it executes or after it ends. The most recent
//! job per domain is also mirrored to `current.json`.

use crate::domain::{ExportDomain, JobId, MeridianError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Terminal and in-flight job states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::PartiallyFailed => "partially_failed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a job, as persisted to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub domain: ExportDomain,
    pub status: JobStatus,
    pub completed: u64,
    pub failed: u64,
    /// Best known total work-item count. Only ever revised upward.
    pub total_known: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Live counters for one running job
///
/// Cloned (via `Arc`) into every worker. All counter updates are atomic,
/// so concurrent workers never lose increments.
pub struct JobProgress {
    id: JobId,
    domain: ExportDomain,
    started_at: DateTime<Utc>,
    completed: AtomicU64,
    failed: AtomicU64,
    total_known: AtomicU64,
    status: Mutex<JobStatus>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobProgress {
    fn new(domain: ExportDomain) -> Self {
        Self {
            id: JobId::generate(domain.name()),
            domain,
            started_at: Utc::now(),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_known: AtomicU64::new(0),
            status: Mutex::new(JobStatus::Running),
            finished_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn domain(&self) -> ExportDomain {
        self.domain
    }

    pub fn record_completed(&self, count: u64) {
        self.completed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failed(&self, count: u64) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Raises the known total. A revision below the current value is
    /// ignored so the total never shrinks mid-run.
    pub fn revise_total(&self, total: u64) {
        self.total_known.fetch_max(total, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: self.id.clone(),
            domain: self.domain,
            status: *self.status.lock().unwrap_or_else(|e| e.into_inner()),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_known: self.total_known.load(Ordering::Relaxed),
            started_at: self.started_at,
            finished_at: *self.finished_at.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    fn mark(&self, status: JobStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        *self.finished_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
    }
}

/// Registry of jobs plus their on-disk sidecars
pub struct ProgressTracker {
    progress_dir: PathBuf,
    jobs: RwLock<HashMap<JobId, Arc<JobProgress>>>,
}

impl ProgressTracker {
    /// Creates a tracker rooted at `<output_dir>/.progress/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the progress directory cannot be created.
    pub fn new(output_dir: &Path) -> Result<Self> {
        let progress_dir = output_dir.join(".progress");
        std::fs::create_dir_all(&progress_dir).map_err(|e| {
            MeridianError::Io(format!(
                "Failed to create progress directory '{}': {e}",
                progress_dir.display()
            ))
        })?;
        Ok(Self {
            progress_dir,
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a new running job and writes its first sidecar.
    pub fn start(&self, domain: ExportDomain) -> Result<Arc<JobProgress>> {
        let job = Arc::new(JobProgress::new(domain));
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id().clone(), Arc::clone(&job));

        tracing::info!(job_id = %job.id(), domain = %domain, "Started extraction job");
        self.persist(&job)?;
        Ok(job)
    }

    /// Writes the job's sidecar and refreshes `current.json`.
    ///
    /// Both writes go through a temp file and rename, so a crash never
    /// leaves a partially written snapshot.
    pub fn persist(&self, job: &JobProgress) -> Result<()> {
        let snapshot = job.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;

        self.write_atomic(&format!("{}.json", job.id()), &json)?;
        self.write_atomic("current.json", &json)?;
        Ok(())
    }

    /// Marks the job finished with the given status and persists it.
    pub fn finish(&self, job: &JobProgress, status: JobStatus) -> Result<()> {
        job.mark(status);
        let snapshot = job.snapshot();
        tracing::info!(
            job_id = %job.id(),
            domain = %job.domain(),
            status = %status,
            completed = snapshot.completed,
            failed = snapshot.failed,
            total = snapshot.total_known,
            "Extraction job finished"
        );
        self.persist(job)
    }

    /// Loads every persisted snapshot, newest first.
    pub fn load_all(&self) -> Result<Vec<ProgressSnapshot>> {
        let mut snapshots = Vec::new();
        let entries = std::fs::read_dir(&self.progress_dir).map_err(|e| {
            MeridianError::Io(format!(
                "Failed to read progress directory '{}': {e}",
                self.progress_dir.display()
            ))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            if name == "current.json" || path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<ProgressSnapshot>(&s).map_err(|e| e.to_string()))
            {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable progress sidecar");
                }
            }
        }

        snapshots.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(snapshots)
    }

    /// Loads the most recently persisted snapshot, if any.
    pub fn load_current(&self) -> Result<Option<ProgressSnapshot>> {
        let path = self.progress_dir.join("current.json");
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| MeridianError::Io(format!("Failed to read '{}': {e}", path.display())))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_atomic(&self, name: &str, content: &str) -> Result<()> {
        let tmp = self.progress_dir.join(format!("{name}.tmp"));
        let dest = self.progress_dir.join(name);
        std::fs::write(&tmp, content)
            .map_err(|e| MeridianError::Io(format!("Failed to write '{}': {e}", tmp.display())))?;
        std::fs::rename(&tmp, &dest).map_err(|e| {
            MeridianError::Io(format!("Failed to finalize '{}': {e}", dest.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_start_writes_sidecar_and_current() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();
        let job = tracker.start(ExportDomain::Patients).unwrap();

        let sidecar = dir
            .path()
            .join(".progress")
            .join(format!("{}.json", job.id()));
        assert!(sidecar.exists());
        assert!(dir.path().join(".progress").join("current.json").exists());
    }

    #[test]
    fn test_counters_accumulate() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();
        let job = tracker.start(ExportDomain::Notes).unwrap();

        job.record_completed(10);
        job.record_completed(5);
        job.record_failed(2);

        let snapshot = job.snapshot();
        assert_eq!(snapshot.completed, 15);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.processed(), 17);
    }

    #[test]
    fn test_total_never_shrinks() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();
        let job = tracker.start(ExportDomain::Workers).unwrap();

        job.revise_total(100);
        job.revise_total(40);
        assert_eq!(job.snapshot().total_known, 100);
        job.revise_total(250);
        assert_eq!(job.snapshot().total_known, 250);
    }

    #[test]
    fn test_concurrent_advances_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();
        let job = tracker.start(ExportDomain::Patients).unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let j = Arc::clone(&job);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    j.record_completed(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(job.snapshot().completed, 5000);
    }

    #[test]
    fn test_finish_persists_terminal_status() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();
        let job = tracker.start(ExportDomain::Alerts).unwrap();

        job.record_completed(3);
        tracker.finish(&job, JobStatus::Succeeded).unwrap();

        let current = tracker.load_current().unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Succeeded);
        assert_eq!(current.completed, 3);
        assert!(current.finished_at.is_some());
    }

    #[test]
    fn test_load_all_orders_newest_first() {
        let dir = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(dir.path()).unwrap();

        let first = tracker.start(ExportDomain::Patients).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = tracker.start(ExportDomain::Notes).unwrap();
        tracker.finish(&first, JobStatus::Succeeded).unwrap();
        tracker.finish(&second, JobStatus::Failed).unwrap();

        let all = tracker.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(&all[0].job_id, second.id());
        assert_eq!(&all[1].job_id, first.id());
    }
}

//! CSV export writing
//!
//! Rows are written to a `.partial` file and the final name only appears
//! on a successful rename, so downstream consumers never pick up a
//! half-written export. Append mode copies the existing file first, which
//! keeps the same guarantee for master files that grow across runs.
//!
//! Files use CRLF line endings to match the downstream ingestion tooling.

use crate::domain::{ExportDomain, ExportRecord, MeridianError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Concurrent-safe CSV writer for one export file
pub struct CsvExportWriter {
    domain: ExportDomain,
    final_path: PathBuf,
    partial_path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
    rows_written: AtomicU64,
}

impl CsvExportWriter {
    /// Starts a fresh export, replacing any previous file on finalize.
    ///
    /// # Errors
    ///
    /// Returns an error if the partial file cannot be created.
    pub fn create(dir: &Path, filename: &str, domain: ExportDomain) -> Result<Self> {
        let final_path = dir.join(filename);
        let partial_path = dir.join(format!("{filename}.partial"));

        std::fs::create_dir_all(dir).map_err(|e| {
            MeridianError::Export(format!(
                "Failed to create output directory '{}': {e}",
                dir.display()
            ))
        })?;

        let file = File::create(&partial_path).map_err(|e| {
            MeridianError::Export(format!(
                "Failed to create '{}': {e}",
                partial_path.display()
            ))
        })?;

        let mut writer = Self::csv_writer(file);
        writer
            .write_record(domain.columns())
            .map_err(|e| MeridianError::Export(format!("Failed to write header: {e}")))?;

        Ok(Self {
            domain,
            final_path,
            partial_path,
            writer: Mutex::new(writer),
            rows_written: AtomicU64::new(0),
        })
    }

    /// Starts an export that appends to an existing file.
    ///
    /// The existing file is copied to the partial path and new rows go
    /// after its last row. The original stays untouched until finalize.
    ///
    /// # Errors
    ///
    /// Returns a schema mismatch error if the existing file's header does
    /// not match the domain's columns.
    pub fn create_append(dir: &Path, filename: &str, domain: ExportDomain) -> Result<Self> {
        let final_path = dir.join(filename);
        if !final_path.exists() {
            return Self::create(dir, filename, domain);
        }

        Self::verify_header(&final_path, domain)?;

        let partial_path = dir.join(format!("{filename}.partial"));
        std::fs::copy(&final_path, &partial_path).map_err(|e| {
            MeridianError::Export(format!(
                "Failed to stage '{}' for append: {e}",
                final_path.display()
            ))
        })?;

        let file = OpenOptions::new()
            .append(true)
            .open(&partial_path)
            .map_err(|e| {
                MeridianError::Export(format!(
                    "Failed to open '{}': {e}",
                    partial_path.display()
                ))
            })?;

        Ok(Self {
            domain,
            final_path,
            partial_path,
            writer: Mutex::new(Self::csv_writer(file)),
            rows_written: AtomicU64::new(0),
        })
    }

    fn csv_writer(file: File) -> csv::Writer<File> {
        csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .has_headers(false)
            .from_writer(file)
    }

    fn verify_header(path: &Path, domain: ExportDomain) -> Result<()> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| MeridianError::Export(format!("Failed to read '{}': {e}", path.display())))?;
        let headers = reader
            .headers()
            .map_err(|e| MeridianError::Export(format!("Failed to read header: {e}")))?;

        let actual: Vec<String> = headers.iter().map(str::to_string).collect();
        let expected: Vec<String> = domain.columns().iter().map(|c| c.to_string()).collect();
        if actual != expected {
            return Err(MeridianError::SchemaMismatch {
                domain: domain.name().to_string(),
                expected: expected.join(","),
                actual: actual.join(","),
            });
        }
        Ok(())
    }

    /// Writes one record. Safe to call from multiple workers.
    ///
    /// # Errors
    ///
    /// Returns a schema mismatch error if the record belongs to a
    /// different domain.
    pub fn write_record(&self, record: &ExportRecord) -> Result<()> {
        if record.domain() != self.domain {
            return Err(MeridianError::SchemaMismatch {
                domain: self.domain.name().to_string(),
                expected: self.domain.name().to_string(),
                actual: record.domain().name().to_string(),
            });
        }

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .write_record(record.values())
            .map_err(|e| MeridianError::Export(format!("Failed to write row: {e}")))?;
        self.rows_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Rows written by this writer (excludes pre-existing rows in append
    /// mode).
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Flushes and atomically promotes the partial file to its final name.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or rename fails.
    pub fn finalize(self) -> Result<PathBuf> {
        let writer = self
            .writer
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        writer
            .into_inner()
            .map_err(|e| MeridianError::Export(format!("Failed to flush export: {e}")))?
            .sync_all()
            .map_err(|e| MeridianError::Export(format!("Failed to sync export: {e}")))?;

        std::fs::rename(&self.partial_path, &self.final_path).map_err(|e| {
            MeridianError::Export(format!(
                "Failed to finalize '{}': {e}",
                self.final_path.display()
            ))
        })?;

        tracing::info!(
            file = %self.final_path.display(),
            rows = self.rows_written.load(Ordering::Relaxed),
            "Finalized export"
        );
        Ok(self.final_path)
    }

    /// Abandons the export, leaving the partial file in place beside an
    /// `.incomplete` sidecar naming the reason. The previous final file,
    /// if any, is untouched.
    pub fn abandon(self, reason: &str) -> Result<()> {
        let rows = self.rows_written.load(Ordering::Relaxed);

        {
            let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = writer.flush() {
                tracing::warn!(error = %e, "Flush failed while abandoning export");
            }
        }

        let sidecar = self.partial_path.with_extension("incomplete");
        let note = serde_json::json!({
            "file": self.final_path.display().to_string(),
            "rows_staged": rows,
            "reason": reason,
            "abandoned_at": chrono::Utc::now().to_rfc3339(),
        });
        std::fs::write(&sidecar, serde_json::to_string_pretty(&note)?).map_err(|e| {
            MeridianError::Export(format!("Failed to write '{}': {e}", sidecar.display()))
        })?;

        tracing::warn!(
            file = %self.final_path.display(),
            rows_staged = rows,
            reason = reason,
            "Abandoned export"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerRecord;
    use tempfile::TempDir;

    fn worker_record(id: &str) -> ExportRecord {
        ExportRecord::Worker(WorkerRecord {
            worker_id: id.to_string(),
            last_name: "Reyes".to_string(),
            first_name: "Ana".to_string(),
            branch: "North".to_string(),
            title: "RN".to_string(),
            phone: "5550100".to_string(),
            email: "ana@example.com".to_string(),
            active: true,
        })
    }

    #[test]
    fn test_partial_until_finalized() {
        let dir = TempDir::new().unwrap();
        let writer =
            CsvExportWriter::create(dir.path(), "worker_data.csv", ExportDomain::Workers).unwrap();
        writer.write_record(&worker_record("w1")).unwrap();

        assert!(dir.path().join("worker_data.csv.partial").exists());
        assert!(!dir.path().join("worker_data.csv").exists());

        let path = writer.finalize().unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("worker_data.csv.partial").exists());
    }

    #[test]
    fn test_header_and_crlf() {
        let dir = TempDir::new().unwrap();
        let writer =
            CsvExportWriter::create(dir.path(), "worker_data.csv", ExportDomain::Workers).unwrap();
        writer.write_record(&worker_record("w1")).unwrap();
        let path = writer.finalize().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.split("\r\n");
        assert_eq!(
            lines.next().unwrap(),
            ExportDomain::Workers.columns().join(",")
        );
        assert!(lines.next().unwrap().starts_with("w1,"));
    }

    #[test]
    fn test_append_preserves_existing_rows() {
        let dir = TempDir::new().unwrap();

        let first =
            CsvExportWriter::create(dir.path(), "worker_data.csv", ExportDomain::Workers).unwrap();
        first.write_record(&worker_record("w1")).unwrap();
        first.finalize().unwrap();

        let second =
            CsvExportWriter::create_append(dir.path(), "worker_data.csv", ExportDomain::Workers)
                .unwrap();
        second.write_record(&worker_record("w2")).unwrap();
        assert_eq!(second.rows_written(), 1);
        let path = second.finalize().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let rows: Vec<_> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("w1,"));
        assert!(rows[2].starts_with("w2,"));
    }

    #[test]
    fn test_append_rejects_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("worker_data.csv"),
            "wrong,header\r\na,b\r\n",
        )
        .unwrap();

        let result =
            CsvExportWriter::create_append(dir.path(), "worker_data.csv", ExportDomain::Workers);
        assert!(matches!(result, Err(MeridianError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_wrong_domain_record_rejected() {
        let dir = TempDir::new().unwrap();
        let writer =
            CsvExportWriter::create(dir.path(), "patient_data.csv", ExportDomain::Patients)
                .unwrap();
        let result = writer.write_record(&worker_record("w1"));
        assert!(matches!(result, Err(MeridianError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_abandon_leaves_final_untouched() {
        let dir = TempDir::new().unwrap();

        let first =
            CsvExportWriter::create(dir.path(), "worker_data.csv", ExportDomain::Workers).unwrap();
        first.write_record(&worker_record("w1")).unwrap();
        first.finalize().unwrap();

        let second =
            CsvExportWriter::create_append(dir.path(), "worker_data.csv", ExportDomain::Workers)
                .unwrap();
        second.write_record(&worker_record("w2")).unwrap();
        second.abandon("upstream failure").unwrap();

        // Original file is still the one-row version.
        let content = std::fs::read_to_string(dir.path().join("worker_data.csv")).unwrap();
        assert!(content.contains("w1,"));
        assert!(!content.contains("w2,"));

        let sidecar = dir.path().join("worker_data.csv.incomplete");
        assert!(sidecar.exists());
        let note: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(note["reason"], "upstream failure");
    }
}

//! Coordination notes extraction
//!
//! Pulls current coordination-note documents created since the previous
//! successful run, decodes their base64 payloads, and appends them to the
//! master notes file. The query window starts 30 minutes before the last
//! successful run finished; downstream dedupes the overlap on
//! Api_Run_Date.

use crate::adapters::fhir::PageWalker;
use crate::core::export::CsvExportWriter;
use crate::core::jobs::fields::{reference_id, reference_tail, str_field};
use crate::core::jobs::{DriverOutcome, JobContext};
use crate::core::progress::{JobProgress, JobStatus};
use crate::domain::{ExportDomain, ExportRecord, NoteRecord, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

const SYNC_BUFFER_MINUTES: i64 = 30;

pub async fn run(ctx: &JobContext, progress: &Arc<JobProgress>) -> Result<DriverOutcome> {
    let since = window_start(ctx, Utc::now());
    tracing::info!(since = %since.to_rfc3339(), "Fetching coordination notes");

    let writer = CsvExportWriter::create_append(
        &ctx.config.output.directory,
        &ctx.config.output.notes_filename,
        ExportDomain::Notes,
    )?;

    let run_timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let params = vec![
        ("category".to_string(), "coordination-note".to_string()),
        ("status".to_string(), "current".to_string()),
        (
            "_count".to_string(),
            ctx.config.extract.batch_size.to_string(),
        ),
        (
            "date".to_string(),
            format!("ge{}", since.format("%Y-%m-%dT%H:%M:%SZ")),
        ),
    ];

    let mut walker = PageWalker::new(Arc::clone(&ctx.client), "DocumentReference", params);
    let mut errors = Vec::new();
    let mut cancelled = false;

    loop {
        if ctx.cancelled() {
            cancelled = true;
            break;
        }
        let page = match walker.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(e) => {
                errors.push(e.to_string());
                break;
            }
        };

        if let Some(total) = page.total {
            progress.revise_total(total);
        } else {
            progress.revise_total(progress.snapshot().processed() + page.resources.len() as u64);
        }

        for resource in &page.resources {
            let (record, decode_ok) = flatten_note(resource, &run_timestamp);
            if !decode_ok {
                tracing::warn!(
                    document = %str_field(resource, "id"),
                    "Failed to decode note attachment"
                );
            }
            writer.write_record(&ExportRecord::Note(record))?;
            progress.record_completed(1);
        }
        ctx.progress.persist(progress)?;
    }

    let rows = writer.rows_written();
    let status = if cancelled {
        JobStatus::Cancelled
    } else if errors.is_empty() {
        JobStatus::Succeeded
    } else if rows > 0 {
        JobStatus::PartiallyFailed
    } else {
        JobStatus::Failed
    };

    let output_file = match status {
        JobStatus::Succeeded | JobStatus::PartiallyFailed => Some(writer.finalize()?),
        _ => {
            writer.abandon(if cancelled {
                "cancelled"
            } else {
                "page fetch failed"
            })?;
            None
        }
    };

    Ok(DriverOutcome {
        status,
        rows_written: rows,
        output_file,
        errors,
    })
}

/// Start of the fetch window: the last successful notes run minus the sync
/// buffer, or 60 days back on a first run.
fn window_start(ctx: &JobContext, now: DateTime<Utc>) -> DateTime<Utc> {
    let last_success = ctx
        .progress
        .load_all()
        .unwrap_or_default()
        .into_iter()
        .filter(|s| s.domain == ExportDomain::Notes && s.status == JobStatus::Succeeded)
        .filter_map(|s| s.finished_at)
        .max();

    match last_success {
        Some(finished) => finished - Duration::minutes(SYNC_BUFFER_MINUTES),
        None => now - Duration::days(ctx.config.extract.notes_window_days),
    }
}

/// Flattens one DocumentReference into a note row.
///
/// Returns the record plus whether the attachment decoded cleanly; a
/// decode failure yields an empty note body rather than dropping the row.
fn flatten_note(resource: &Value, run_timestamp: &str) -> (NoteRecord, bool) {
    let patient_id = resource
        .get("subject")
        .map(|s| reference_id(&str_field(s, "reference"), "Patient"))
        .unwrap_or_default();

    let worker_id = resource
        .get("author")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .map(|a| reference_id(&str_field(a, "reference"), "Practitioner"))
        .unwrap_or_default();

    let note_type = resource
        .get("type")
        .map(|t| str_field(t, "text"))
        .unwrap_or_default();

    let last_update = resource
        .get("meta")
        .map(|m| str_field(m, "lastUpdated"))
        .unwrap_or_default();

    let episode_id = resource
        .get("context")
        .and_then(|c| c.get("encounter"))
        .and_then(Value::as_array)
        .and_then(|e| e.first())
        .map(|e| reference_tail(&str_field(e, "reference")))
        .unwrap_or_default();

    let encoded = resource
        .get("content")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("attachment"))
        .map(|a| str_field(a, "data"))
        .unwrap_or_default();

    let (note, decode_ok) = if encoded.is_empty() {
        (String::new(), true)
    } else {
        match BASE64
            .decode(&encoded)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
        {
            Some(text) => (text, true),
            None => (String::new(), false),
        }
    };

    let record = NoteRecord {
        patient_id,
        note_date: str_field(resource, "date"),
        note_type,
        worker_id,
        note_status: str_field(resource, "status"),
        last_update,
        note,
        episode_id,
        api_run_date: run_timestamp.to_string(),
    };
    (record, decode_ok)
}

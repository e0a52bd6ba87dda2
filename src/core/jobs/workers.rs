//! Worker roster extraction
//!
//! Pulls the full practitioner directory and keeps the agency's field
//! workers: resources carrying the practitioner-worker secondary
//! identifier whose HomeBranch extension names a configured target
//! branch. An empty target list keeps every branch.

use crate::adapters::fhir::PageWalker;
use crate::core::export::CsvExportWriter;
use crate::core::jobs::fields::{name_parts, str_field};
use crate::core::jobs::{DriverOutcome, JobContext};
use crate::core::progress::{JobProgress, JobStatus};
use crate::domain::{ExportDomain, ExportRecord, Result, WorkerRecord};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

const DIRECTORY_PAGE_SIZE: usize = 200;
const DIRECTORY_ELEMENTS: &str = "id,identifier,name,telecom,extension,active,qualification";

pub async fn run(ctx: &JobContext, progress: &Arc<JobProgress>) -> Result<DriverOutcome> {
    let writer = CsvExportWriter::create(
        &ctx.config.output.directory,
        &ctx.config.output.workers_filename,
        ExportDomain::Workers,
    )?;

    let params = vec![
        ("active".to_string(), "true,false".to_string()),
        ("_count".to_string(), DIRECTORY_PAGE_SIZE.to_string()),
        ("_elements".to_string(), DIRECTORY_ELEMENTS.to_string()),
    ];

    let targets = &ctx.config.extract.target_branches;
    let mut walker = PageWalker::new(Arc::clone(&ctx.client), "Practitioner", params);
    let mut seen: HashSet<String> = HashSet::new();
    let mut directory_size = 0u64;
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
                writer.abandon("directory fetch failed")?;
                return Err(e);
            }
        };
        directory_size += page.resources.len() as u64;
        progress.revise_total(directory_size);

        for resource in &page.resources {
            if !is_field_worker(resource) {
                progress.record_completed(1);
                continue;
            }
            let Some(record) = flatten_worker(resource) else {
                progress.record_failed(1);
                continue;
            };
            let keep = (targets.is_empty() || targets.contains(&record.branch))
                && seen.insert(record.worker_id.clone());
            if keep {
                writer.write_record(&ExportRecord::Worker(record))?;
            }
            // Every directory entry counts as processed, kept or not,
            // so the counters reconcile with the directory size.
            progress.record_completed(1);
        }
        ctx.progress.persist(progress)?;
    }

    tracing::info!(
        directory = directory_size,
        workers = writer.rows_written(),
        "Filtered worker roster"
    );

    let rows = writer.rows_written();
    let status = if cancelled {
        JobStatus::Cancelled
    } else {
        JobStatus::Succeeded
    };
    let output_file = if cancelled {
        writer.abandon("cancelled")?;
        None
    } else {
        Some(writer.finalize()?)
    };

    Ok(DriverOutcome {
        status,
        rows_written: rows,
        output_file,
        errors: Vec::new(),
    })
}

/// Whether the practitioner carries the practitioner-worker secondary
/// identifier.
fn is_field_worker(resource: &Value) -> bool {
    resource
        .get("identifier")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter().any(|id| {
                str_field(id, "use") == "secondary"
                    && id
                        .get("type")
                        .map(|t| str_field(t, "text") == "referenceTable")
                        .unwrap_or(false)
                    && str_field(id, "value") == "practitioner-worker"
            })
        })
        .unwrap_or(false)
}

/// Branch display name from the HomeBranch extension, either nested under
/// practitioner-details or at the top level.
fn home_branch(resource: &Value) -> String {
    let Some(extensions) = resource.get("extension").and_then(Value::as_array) else {
        return String::new();
    };

    let branch_of = |ext: &Value| {
        (str_field(ext, "url") == "HomeBranch" || str_field(ext, "url").ends_with("/HomeBranch"))
            .then(|| {
                ext.get("valueReference")
                    .map(|r| str_field(r, "display"))
                    .unwrap_or_default()
            })
            .filter(|b| !b.is_empty())
    };

    for ext in extensions {
        if str_field(ext, "url").ends_with("practitioner-details") {
            if let Some(nested) = ext.get("extension").and_then(Value::as_array) {
                if let Some(branch) = nested.iter().find_map(branch_of) {
                    return branch;
                }
            }
        } else if let Some(branch) = branch_of(ext) {
            return branch;
        }
    }
    String::new()
}

fn flatten_worker(resource: &Value) -> Option<WorkerRecord> {
    let worker_id = str_field(resource, "id");
    if worker_id.is_empty() {
        return None;
    }

    let (last_name, first_name, _) = name_parts(resource);

    let mut phone = String::new();
    let mut email = String::new();
    if let Some(telecoms) = resource.get("telecom").and_then(Value::as_array) {
        for telecom in telecoms {
            match str_field(telecom, "system").as_str() {
                "phone" if phone.is_empty() => phone = str_field(telecom, "value"),
                "email" if email.is_empty() => email = str_field(telecom, "value"),
                _ => {}
            }
        }
    }

    let title = resource
        .get("qualification")
        .and_then(Value::as_array)
        .and_then(|q| q.first())
        .and_then(|q| q.get("code"))
        .map(|c| str_field(c, "text"))
        .unwrap_or_default();

    Some(WorkerRecord {
        worker_id,
        last_name,
        first_name,
        branch: home_branch(resource),
        title,
        phone,
        email,
        active: resource
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

//! Patient demographics extraction
//!
//! Walks the active-patient roster, flattens each resource to one
//! demographics row, and writes the roster export. Resources without a
//! birth date are skipped, matching the downstream consumer's contract.

use crate::adapters::fhir::PageWalker;
use crate::core::export::CsvExportWriter;
use crate::core::jobs::fields::{name_parts, preferred_phone, str_field};
use crate::core::jobs::{DriverOutcome, JobContext};
use crate::core::orchestrator::{partition, run_batches};
use crate::core::progress::{JobProgress, JobStatus};
use crate::domain::{ExportDomain, ExportRecord, PatientRecord, Result};
use serde_json::Value;
use std::sync::Arc;

const ROSTER_ELEMENTS: &str = "id,name,birthDate,address,telecom";

pub async fn run(ctx: &JobContext, progress: &Arc<JobProgress>) -> Result<DriverOutcome> {
    let writer = Arc::new(CsvExportWriter::create(
        &ctx.config.output.directory,
        &ctx.config.output.patients_filename,
        ExportDomain::Patients,
    )?);

    let roster = match fetch_active_patients(ctx, progress).await {
        Ok(roster) => roster,
        Err(e) => {
            writer_abandon(writer, &e.to_string());
            return Err(e);
        }
    };

    progress.revise_total(roster.len() as u64);
    ctx.progress.persist(progress)?;

    let batches = partition(roster, ctx.config.extract.batch_size);
    tracing::info!(
        patients = progress.snapshot().total_known,
        batches = batches.len(),
        "Flattening patient roster"
    );

    let outcome = {
        let writer = Arc::clone(&writer);
        let progress = Arc::clone(progress);
        run_batches(
            batches,
            ctx.config.extract.max_workers,
            ctx.cancel.clone(),
            move |batch| {
                let writer = Arc::clone(&writer);
                let progress = Arc::clone(&progress);
                async move {
                    let mut rows = 0u64;
                    for resource in &batch.items {
                        match flatten_patient(resource) {
                            Some(record) => {
                                writer.write_record(&ExportRecord::Patient(record))?;
                                rows += 1;
                                progress.record_completed(1);
                            }
                            None => progress.record_failed(1),
                        }
                    }
                    Ok(rows)
                }
            },
        )
        .await
    };

    ctx.progress.persist(progress)?;

    let status = outcome.status();
    let output_file = match status {
        JobStatus::Succeeded | JobStatus::PartiallyFailed => match Arc::try_unwrap(writer) {
            Ok(w) => Some(w.finalize()?),
            Err(_) => {
                return Err(crate::domain::MeridianError::Export(
                    "Export writer still shared after pool shutdown".to_string(),
                ))
            }
        },
        _ => {
            writer_abandon(writer, "run did not complete");
            None
        }
    };

    Ok(DriverOutcome {
        status,
        rows_written: outcome.records_written,
        output_file,
        errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
    })
}

/// Fetches the full active-patient roster, dropping resources without a
/// birth date.
pub(crate) async fn fetch_active_patients(
    ctx: &JobContext,
    progress: &Arc<JobProgress>,
) -> Result<Vec<Value>> {
    let params = vec![
        ("active".to_string(), "true".to_string()),
        (
            "_count".to_string(),
            ctx.config.extract.patient_batch_size.to_string(),
        ),
        ("_elements".to_string(), ROSTER_ELEMENTS.to_string()),
    ];

    let mut walker = PageWalker::new(Arc::clone(&ctx.client), "Patient", params);
    let mut roster = Vec::new();
    let mut skipped = 0u64;

    while let Some(page) = walker.next_page().await? {
        for resource in page.resources {
            if str_field(&resource, "birthDate").is_empty() {
                skipped += 1;
            } else {
                roster.push(resource);
            }
        }
        // The workload is the retained roster, not the server's raw
        // match count, so the total tracks what will actually be
        // processed.
        progress.revise_total(roster.len() as u64);
        if ctx.cancelled() {
            break;
        }
    }

    tracing::info!(
        patients = roster.len(),
        skipped_no_birthdate = skipped,
        "Retrieved active patient roster"
    );
    Ok(roster)
}

/// Flattens one Patient resource to a demographics row.
///
/// Returns `None` when the resource has no id, which would produce an
/// unusable row.
pub(crate) fn flatten_patient(resource: &Value) -> Option<PatientRecord> {
    let patient_id = str_field(resource, "id");
    if patient_id.is_empty() {
        return None;
    }

    let (last_name, first_name, middle_initial) = name_parts(resource);

    let address = resource
        .get("address")
        .and_then(Value::as_array)
        .and_then(|a| a.first());
    let (street, city, state, zip, county) = match address {
        Some(addr) => (
            addr.get("line")
                .and_then(Value::as_array)
                .and_then(|l| l.first())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            str_field(addr, "city"),
            str_field(addr, "state"),
            str_field(addr, "postalCode"),
            str_field(addr, "district"),
        ),
        None => Default::default(),
    };

    Some(PatientRecord {
        patient_id,
        last_name,
        first_name,
        middle_initial,
        street,
        city,
        state,
        zip,
        county,
        phone: preferred_phone(resource),
    })
}

fn writer_abandon(writer: Arc<CsvExportWriter>, reason: &str) {
    if let Ok(w) = Arc::try_unwrap(writer) {
        if let Err(e) = w.abandon(reason) {
            tracing::warn!(error = %e, "Failed to mark export incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient(id: &str) -> Value {
        json!({
            "resourceType": "Patient",
            "id": id,
            "birthDate": "1948-03-12",
            "name": [{"use": "official", "family": "Holt", "given": ["Ada", "Marie"]}],
            "address": [{
                "line": ["12 Elm St"],
                "city": "Wichita Falls",
                "state": "TX",
                "postalCode": "76301",
                "district": "Wichita"
            }],
            "telecom": [{"system": "phone", "use": "home", "value": "9405550101"}]
        })
    }

    #[test]
    fn test_flatten_full_patient() {
        let record = flatten_patient(&patient("p1")).unwrap();
        assert_eq!(record.patient_id, "p1");
        assert_eq!(record.last_name, "Holt");
        assert_eq!(record.first_name, "Ada");
        assert_eq!(record.middle_initial, "M");
        assert_eq!(record.street, "12 Elm St");
        assert_eq!(record.county, "Wichita");
        assert_eq!(record.phone, "940-555-0101");
    }

    #[test]
    fn test_flatten_sparse_patient() {
        let record = flatten_patient(&json!({"id": "p2"})).unwrap();
        assert_eq!(record.patient_id, "p2");
        assert_eq!(record.last_name, "");
        assert_eq!(record.street, "");
        assert_eq!(record.phone, "");
    }

    #[test]
    fn test_flatten_missing_id_rejected() {
        assert!(flatten_patient(&json!({"birthDate": "1950-01-01"})).is_none());
    }
}

//! Alert roster extraction
//!
//! Joins the active-patient roster with two per-patient lookups: an
//! oxygen flag derived from the patient's medication requests, and the
//! location of their most recent encounter. Patients are processed in
//! encounter-sized batches through the worker pool.

use crate::adapters::fhir::FhirClient;
use crate::core::export::CsvExportWriter;
use crate::core::jobs::fields::str_field;
use crate::core::jobs::patients::{fetch_active_patients, flatten_patient};
use crate::core::jobs::{DriverOutcome, JobContext};
use crate::core::orchestrator::{partition, run_batches};
use crate::core::progress::{JobProgress, JobStatus};
use crate::domain::{AlertRecord, ExportDomain, ExportRecord, MeridianError, Result};
use serde_json::Value;
use std::sync::Arc;

/// Display-text fragments that mark a medication as oxygen therapy.
const O2_KEYWORDS: &[&str] = &[
    "oxygen",
    "o2",
    "concentrator",
    "nasal cannula",
    "cpap",
    "bipap",
    "ventilator",
];

pub async fn run(ctx: &JobContext, progress: &Arc<JobProgress>) -> Result<DriverOutcome> {
    let writer = Arc::new(CsvExportWriter::create(
        &ctx.config.output.directory,
        &ctx.config.output.alerts_filename,
        ExportDomain::Alerts,
    )?);

    let roster = match fetch_active_patients(ctx, progress).await {
        Ok(roster) => roster,
        Err(e) => {
            if let Ok(w) = Arc::try_unwrap(writer) {
                w.abandon("roster fetch failed")?;
            }
            return Err(e);
        }
    };

    progress.revise_total(roster.len() as u64);
    ctx.progress.persist(progress)?;

    let batches = partition(roster, ctx.config.extract.encounter_batch_size);
    tracing::info!(
        patients = progress.snapshot().total_known,
        batches = batches.len(),
        "Joining roster with encounter and medication data"
    );

    let outcome = {
        let writer = Arc::clone(&writer);
        let progress = Arc::clone(progress);
        let client = Arc::clone(&ctx.client);
        run_batches(
            batches,
            ctx.config.extract.max_workers,
            ctx.cancel.clone(),
            move |batch| {
                let writer = Arc::clone(&writer);
                let progress = Arc::clone(&progress);
                let client = Arc::clone(&client);
                async move {
                    let mut rows = 0u64;
                    for resource in &batch.items {
                        let Some(demographics) = flatten_patient(resource) else {
                            progress.record_failed(1);
                            continue;
                        };
                        match enrich_patient(&client, &demographics.patient_id).await {
                            Ok((o2, location_name)) => {
                                writer.write_record(&ExportRecord::Alert(AlertRecord {
                                    demographics,
                                    o2,
                                    location_name,
                                }))?;
                                rows += 1;
                                progress.record_completed(1);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    patient = %demographics.patient_id,
                                    error = %e,
                                    "Skipping patient after lookup failure"
                                );
                                progress.record_failed(1);
                            }
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
                return Err(MeridianError::Export(
                    "Export writer still shared after pool shutdown".to_string(),
                ))
            }
        },
        _ => {
            if let Ok(w) = Arc::try_unwrap(writer) {
                w.abandon("run did not complete")?;
            }
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

/// The oxygen flag and latest encounter location for one patient.
async fn enrich_patient(client: &Arc<FhirClient>, patient_id: &str) -> Result<(bool, String)> {
    let medications = client
        .search(
            "MedicationRequest",
            &[
                ("patient", format!("Patient/{patient_id}")),
                ("status", "active,completed".to_string()),
                ("_count", "100".to_string()),
            ],
        )
        .await?;
    let o2 = medications.resources.iter().any(is_oxygen_medication);

    let encounters = client
        .search(
            "Encounter",
            &[
                ("subject", format!("Patient/{patient_id}")),
                ("_sort", "-date".to_string()),
                ("_count", "10".to_string()),
            ],
        )
        .await?;
    let location_name = encounters
        .resources
        .iter()
        .find_map(|e| encounter_location(e))
        .unwrap_or_default();

    Ok((o2, location_name))
}

/// Whether a MedicationRequest's display text names oxygen therapy.
fn is_oxygen_medication(resource: &Value) -> bool {
    let mut texts: Vec<String> = Vec::new();

    if let Some(concept) = resource.get("medicationCodeableConcept") {
        texts.push(str_field(concept, "text"));
        if let Some(codings) = concept.get("coding").and_then(Value::as_array) {
            for coding in codings {
                texts.push(str_field(coding, "display"));
            }
        }
    }
    if let Some(reference) = resource.get("medicationReference") {
        texts.push(str_field(reference, "display"));
    }

    texts.iter().any(|text| {
        let lower = text.to_lowercase();
        !lower.is_empty() && O2_KEYWORDS.iter().any(|k| lower.contains(k))
    })
}

/// Display of the first location entry on an encounter, if any.
fn encounter_location(encounter: &Value) -> Option<String> {
    encounter
        .get("location")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|entry| {
            let display = entry
                .get("location")
                .map(|l| str_field(l, "display"))
                .unwrap_or_default();
            (!display.is_empty()).then_some(display)
        })
}

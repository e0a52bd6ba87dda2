//! Weekly appointment extraction
//!
//! Fans the current Monday-to-Sunday week out through the worker pool,
//! one day per batch, and collects skilled-nursing appointments. The
//! detailed status and visit number live in vendor extensions; the
//! performer practitioner is the PRF participant.

use crate::adapters::fhir::PageWalker;
use crate::core::export::CsvExportWriter;
use crate::core::jobs::fields::{reference_id, str_field};
use crate::core::jobs::{DriverOutcome, JobContext};
use crate::core::orchestrator::{partition, run_batches};
use crate::core::progress::{JobProgress, JobStatus};
use crate::domain::{AppointmentRecord, ExportDomain, ExportRecord, MeridianError, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

const DETAILED_STATUS_URL: &str = "detailed-status";
const ENTITY_INDEX_URL: &str = "entity-index";
const SUBJECT_URL: &str = "subject";

pub async fn run(ctx: &JobContext, progress: &Arc<JobProgress>) -> Result<DriverOutcome> {
    let days = current_week(Utc::now().date_naive());
    progress.revise_total(days.len() as u64);
    ctx.progress.persist(progress)?;

    tracing::info!(
        from = %days[0],
        to = %days[days.len() - 1],
        service_code = %ctx.config.extract.appointment_service_code,
        "Fetching weekly appointments"
    );

    let writer = Arc::new(CsvExportWriter::create(
        &ctx.config.output.directory,
        &ctx.config.output.appointments_filename,
        ExportDomain::Appointments,
    )?);

    // One day per batch; the pool caps how many days are in flight.
    let batches = partition(days, 1);

    let outcome = {
        let writer = Arc::clone(&writer);
        let progress = Arc::clone(progress);
        let client = Arc::clone(&ctx.client);
        let service_code = ctx.config.extract.appointment_service_code.clone();
        let page_size = ctx.config.extract.batch_size;
        run_batches(
            batches,
            ctx.config.extract.max_workers,
            ctx.cancel.clone(),
            move |batch| {
                let writer = Arc::clone(&writer);
                let progress = Arc::clone(&progress);
                let client = Arc::clone(&client);
                let service_code = service_code.clone();
                async move {
                    let day = batch.items[0];
                    let params = vec![
                        ("date".to_string(), format!("eq{day}")),
                        ("service-type".to_string(), service_code.clone()),
                        ("_sort".to_string(), "date".to_string()),
                        ("_count".to_string(), page_size.to_string()),
                    ];
                    let resources = PageWalker::new(client, "Appointment", params)
                        .collect_all()
                        .await
                        .map_err(|e| {
                            progress.record_failed(1);
                            e
                        })?;

                    let collected_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
                    let mut rows = 0u64;
                    for resource in &resources {
                        let record = flatten_appointment(resource, &collected_at);
                        // The server-side filter is advisory; enforce it here.
                        if record.service_code != service_code {
                            continue;
                        }
                        writer.write_record(&ExportRecord::Appointment(record))?;
                        rows += 1;
                    }
                    progress.record_completed(1);
                    tracing::debug!(day = %day, appointments = rows, "Processed day");
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

/// The Monday through Sunday containing `today`.
fn current_week(today: NaiveDate) -> Vec<NaiveDate> {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    (0..7).map(|d| monday + Duration::days(d)).collect()
}

fn flatten_appointment(resource: &Value, collected_at: &str) -> AppointmentRecord {
    let mut patient_id = String::new();
    let mut practitioner_id = String::new();

    if let Some(participants) = resource.get("participant").and_then(Value::as_array) {
        for participant in participants {
            let Some(actor) = participant.get("actor") else {
                continue;
            };
            let reference = str_field(actor, "reference");
            if reference.starts_with("Patient/") {
                patient_id = reference_id(&reference, "Patient");
            } else if reference.starts_with("Practitioner/")
                && (is_performer(participant) || participant.get("type").is_none())
            {
                practitioner_id = reference_id(&reference, "Practitioner");
            }
        }
    }

    // Some appointments carry the patient only in the subject extension.
    if patient_id.is_empty() {
        patient_id = extension_reference(resource, SUBJECT_URL, "Patient");
    }

    let status_value = nested_extension_string(resource, DETAILED_STATUS_URL, "StatusValue");
    let visit_number = extension_integer(resource, ENTITY_INDEX_URL);

    let appointment_datetime = match str_field(resource, "start") {
        s if s.is_empty() => String::new(),
        s => chrono::DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or(s),
    };

    let (service_code, service_type) = service_parts(resource);

    AppointmentRecord {
        appointment_id: str_field(resource, "id"),
        patient_id,
        practitioner_id,
        visit_number,
        appointment_datetime,
        status: str_field(resource, "status"),
        status_value,
        service_code,
        service_type,
        collection_timestamp: collected_at.to_string(),
    }
}

fn is_performer(participant: &Value) -> bool {
    participant
        .get("type")
        .and_then(Value::as_array)
        .map(|types| {
            types.iter().any(|t| {
                t.get("coding")
                    .and_then(Value::as_array)
                    .map(|codings| {
                        codings.iter().any(|c| {
                            str_field(c, "code") == "PRF" || str_field(c, "display") == "Performer"
                        })
                    })
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Value of a string extension nested one level under an extension whose
/// url ends with `outer_suffix`. Falls back to a top-level extension with
/// the inner url.
fn nested_extension_string(resource: &Value, outer_suffix: &str, inner_url: &str) -> String {
    let Some(extensions) = resource.get("extension").and_then(Value::as_array) else {
        return String::new();
    };

    for ext in extensions {
        let url = str_field(ext, "url");
        if url.ends_with(outer_suffix) {
            if let Some(nested) = ext.get("extension").and_then(Value::as_array) {
                for inner in nested {
                    if str_field(inner, "url") == inner_url {
                        return str_field(inner, "valueString");
                    }
                }
            }
        } else if url == inner_url {
            return str_field(ext, "valueString");
        }
    }
    String::new()
}

fn extension_integer(resource: &Value, url_suffix: &str) -> String {
    resource
        .get("extension")
        .and_then(Value::as_array)
        .and_then(|exts| {
            exts.iter()
                .find(|e| str_field(e, "url").ends_with(url_suffix))
        })
        .and_then(|e| e.get("valueInteger"))
        .and_then(Value::as_i64)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn extension_reference(resource: &Value, url_suffix: &str, resource_type: &str) -> String {
    resource
        .get("extension")
        .and_then(Value::as_array)
        .and_then(|exts| {
            exts.iter()
                .find(|e| str_field(e, "url").ends_with(url_suffix))
        })
        .and_then(|e| e.get("valueReference"))
        .map(|r| reference_id(&str_field(r, "reference"), resource_type))
        .unwrap_or_default()
}

fn service_parts(resource: &Value) -> (String, String) {
    let Some(first) = resource
        .get("serviceType")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        return Default::default();
    };

    let mut service_type = str_field(first, "text");
    let mut service_code = String::new();

    if let Some(coding) = first
        .get("coding")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        service_code = str_field(coding, "code");
        if service_type.is_empty() {
            service_type = str_field(coding, "display");
        }
    }
    (service_code, service_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn appointment() -> Value {
        json!({
            "resourceType": "Appointment",
            "id": "a1",
            "status": "booked",
            "start": "2026-08-24T13:30:00Z",
            "participant": [
                {"actor": {"reference": "Patient/p1"}},
                {
                    "actor": {"reference": "Practitioner/w9"},
                    "type": [{"coding": [{"code": "PRF", "display": "Performer"}]}]
                }
            ],
            "extension": [
                {
                    "url": "https://api.example.com/fhir/r4/StructureDefinition/detailed-status",
                    "extension": [{"url": "StatusValue", "valueString": "Scheduled"}]
                },
                {
                    "url": "https://api.example.com/fhir/r4/StructureDefinition/entity-index",
                    "valueInteger": 4
                }
            ],
            "serviceType": [{
                "text": "Skilled Nursing",
                "coding": [{"code": "SN11", "display": "Skilled Nursing Visit"}]
            }]
        })
    }

    #[test]
    fn test_current_week_starts_monday() {
        // 2026-08-29 is a Saturday.
        let days = current_week(NaiveDate::from_ymd_opt(2026, 8, 29).unwrap());
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        assert_eq!(days[6], NaiveDate::from_ymd_opt(2026, 8, 30).unwrap());
    }

    #[test]
    fn test_current_week_on_monday() {
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(current_week(monday)[0], monday);
    }

    #[test]
    fn test_flatten_full_appointment() {
        let record = flatten_appointment(&appointment(), "2026-08-29T10:00:00");
        assert_eq!(record.appointment_id, "a1");
        assert_eq!(record.patient_id, "p1");
        assert_eq!(record.practitioner_id, "w9");
        assert_eq!(record.visit_number, "4");
        assert_eq!(record.appointment_datetime, "2026-08-24 13:30:00");
        assert_eq!(record.status, "booked");
        assert_eq!(record.status_value, "Scheduled");
        assert_eq!(record.service_code, "SN11");
        assert_eq!(record.service_type, "Skilled Nursing");
    }

    #[test]
    fn test_patient_from_subject_extension() {
        let resource = json!({
            "id": "a2",
            "extension": [{
                "url": "https://api.example.com/fhir/r4/StructureDefinition/subject",
                "valueReference": {"reference": "Patient/p5"}
            }]
        });
        let record = flatten_appointment(&resource, "t");
        assert_eq!(record.patient_id, "p5");
    }

    #[test]
    fn test_untyped_practitioner_treated_as_performer() {
        let resource = json!({
            "id": "a3",
            "participant": [{"actor": {"reference": "Practitioner/w2"}}]
        });
        let record = flatten_appointment(&resource, "t");
        assert_eq!(record.practitioner_id, "w2");
    }

    #[test]
    fn test_unparseable_start_kept_verbatim() {
        let resource = json!({"id": "a4", "start": "sometime"});
        let record = flatten_appointment(&resource, "t");
        assert_eq!(record.appointment_datetime, "sometime");
    }
}

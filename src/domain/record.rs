//! Export record variants
//!
//! Each extraction domain produces a fixed, flattened output schema. Rather
//! than shaping rows through runtime field lookups, the domains form a closed
//! set of tagged variants with the column list fixed at compile time, so a
//! record can never silently gain or lose a column mid-run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The extraction domains supported by Meridian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportDomain {
    /// Patient demographics
    Patients,
    /// Care coordination notes
    Notes,
    /// Weekly appointment schedule
    Appointments,
    /// Worker/practitioner roster
    Workers,
    /// Alert roster (demographics joined with encounter locations)
    Alerts,
}

impl ExportDomain {
    /// All domains, in the order the `extract all` command runs them.
    pub const ALL: [ExportDomain; 5] = [
        ExportDomain::Patients,
        ExportDomain::Notes,
        ExportDomain::Appointments,
        ExportDomain::Workers,
        ExportDomain::Alerts,
    ];

    /// Stable lowercase name used in CLI arguments, job IDs, and filenames.
    pub fn name(&self) -> &'static str {
        match self {
            ExportDomain::Patients => "patients",
            ExportDomain::Notes => "notes",
            ExportDomain::Appointments => "appointments",
            ExportDomain::Workers => "workers",
            ExportDomain::Alerts => "alerts",
        }
    }

    /// The fixed CSV column schema for this domain.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ExportDomain::Patients => &[
                "patientId",
                "lastName",
                "firstName",
                "mi",
                "street",
                "city",
                "state",
                "zip",
                "county",
                "phone",
            ],
            ExportDomain::Notes => &[
                "Patient_ID",
                "Note_Date",
                "Note_Type",
                "Worker_ID",
                "Note_Status",
                "Last_Update",
                "Note",
                "Episode_ID",
                "Api_Run_Date",
            ],
            ExportDomain::Appointments => &[
                "appointmentId",
                "patientId",
                "practitionerId",
                "visitNumber",
                "appointmentDatetime",
                "status",
                "statusValue",
                "serviceCode",
                "serviceType",
                "collectionTimestamp",
            ],
            ExportDomain::Workers => &[
                "workerId",
                "lastName",
                "firstName",
                "branch",
                "title",
                "phone",
                "email",
                "active",
            ],
            ExportDomain::Alerts => &[
                "patientId",
                "lastName",
                "firstName",
                "mi",
                "street",
                "city",
                "state",
                "zip",
                "county",
                "phone",
                "o2",
                "locationName",
            ],
        }
    }

    /// The FHIR resource type this domain's primary query targets.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ExportDomain::Patients | ExportDomain::Alerts => "Patient",
            ExportDomain::Notes => "DocumentReference",
            ExportDomain::Appointments => "Appointment",
            ExportDomain::Workers => "Practitioner",
        }
    }
}

impl fmt::Display for ExportDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ExportDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "patients" => Ok(ExportDomain::Patients),
            "notes" => Ok(ExportDomain::Notes),
            "appointments" => Ok(ExportDomain::Appointments),
            "workers" => Ok(ExportDomain::Workers),
            "alerts" => Ok(ExportDomain::Alerts),
            other => Err(format!(
                "Unknown domain '{other}'. Supported: patients, notes, appointments, workers, alerts"
            )),
        }
    }
}

/// One flattened patient demographics row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientRecord {
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_initial: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub county: String,
    pub phone: String,
}

/// One decoded coordination note row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteRecord {
    pub patient_id: String,
    pub note_date: String,
    pub note_type: String,
    pub worker_id: String,
    pub note_status: String,
    pub last_update: String,
    pub note: String,
    pub episode_id: String,
    pub api_run_date: String,
}

/// One appointment row for the weekly schedule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentRecord {
    pub appointment_id: String,
    pub patient_id: String,
    pub practitioner_id: String,
    pub visit_number: String,
    pub appointment_datetime: String,
    pub status: String,
    pub status_value: String,
    pub service_code: String,
    pub service_type: String,
    pub collection_timestamp: String,
}

/// One worker roster row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub last_name: String,
    pub first_name: String,
    pub branch: String,
    pub title: String,
    pub phone: String,
    pub email: String,
    pub active: bool,
}

/// One alert roster row: demographics plus encounter location data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertRecord {
    pub demographics: PatientRecord,
    pub o2: bool,
    pub location_name: String,
}

/// A single validated record destined for one domain's CSV export
///
/// Each variant carries a complete row; the writer rejects a record whose
/// variant does not match the writer's configured domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportRecord {
    Patient(PatientRecord),
    Note(NoteRecord),
    Appointment(AppointmentRecord),
    Worker(WorkerRecord),
    Alert(AlertRecord),
}

impl ExportRecord {
    /// The domain this record belongs to.
    pub fn domain(&self) -> ExportDomain {
        match self {
            ExportRecord::Patient(_) => ExportDomain::Patients,
            ExportRecord::Note(_) => ExportDomain::Notes,
            ExportRecord::Appointment(_) => ExportDomain::Appointments,
            ExportRecord::Worker(_) => ExportDomain::Workers,
            ExportRecord::Alert(_) => ExportDomain::Alerts,
        }
    }

    /// Row values in the exact column order of `domain().columns()`.
    pub fn values(&self) -> Vec<String> {
        match self {
            ExportRecord::Patient(r) => vec![
                r.patient_id.clone(),
                r.last_name.clone(),
                r.first_name.clone(),
                r.middle_initial.clone(),
                r.street.clone(),
                r.city.clone(),
                r.state.clone(),
                r.zip.clone(),
                r.county.clone(),
                r.phone.clone(),
            ],
            ExportRecord::Note(r) => vec![
                r.patient_id.clone(),
                r.note_date.clone(),
                r.note_type.clone(),
                r.worker_id.clone(),
                r.note_status.clone(),
                r.last_update.clone(),
                r.note.clone(),
                r.episode_id.clone(),
                r.api_run_date.clone(),
            ],
            ExportRecord::Appointment(r) => vec![
                r.appointment_id.clone(),
                r.patient_id.clone(),
                r.practitioner_id.clone(),
                r.visit_number.clone(),
                r.appointment_datetime.clone(),
                r.status.clone(),
                r.status_value.clone(),
                r.service_code.clone(),
                r.service_type.clone(),
                r.collection_timestamp.clone(),
            ],
            ExportRecord::Worker(r) => vec![
                r.worker_id.clone(),
                r.last_name.clone(),
                r.first_name.clone(),
                r.branch.clone(),
                r.title.clone(),
                r.phone.clone(),
                r.email.clone(),
                r.active.to_string(),
            ],
            ExportRecord::Alert(r) => {
                let d = &r.demographics;
                vec![
                    d.patient_id.clone(),
                    d.last_name.clone(),
                    d.first_name.clone(),
                    d.middle_initial.clone(),
                    d.street.clone(),
                    d.city.clone(),
                    d.state.clone(),
                    d.zip.clone(),
                    d.county.clone(),
                    d.phone.clone(),
                    r.o2.to_string(),
                    r.location_name.clone(),
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ExportDomain::Patients, 10)]
    #[test_case(ExportDomain::Notes, 9)]
    #[test_case(ExportDomain::Appointments, 10)]
    #[test_case(ExportDomain::Workers, 8)]
    #[test_case(ExportDomain::Alerts, 12)]
    fn test_column_counts(domain: ExportDomain, expected: usize) {
        assert_eq!(domain.columns().len(), expected);
    }

    #[test]
    fn test_record_values_match_column_count() {
        let records = [
            ExportRecord::Patient(PatientRecord::default()),
            ExportRecord::Note(NoteRecord::default()),
            ExportRecord::Appointment(AppointmentRecord::default()),
            ExportRecord::Worker(WorkerRecord::default()),
            ExportRecord::Alert(AlertRecord::default()),
        ];
        for record in &records {
            assert_eq!(
                record.values().len(),
                record.domain().columns().len(),
                "value/column mismatch for {}",
                record.domain()
            );
        }
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!(
            ExportDomain::from_str("patients").unwrap(),
            ExportDomain::Patients
        );
        assert_eq!(
            ExportDomain::from_str("APPOINTMENTS").unwrap(),
            ExportDomain::Appointments
        );
        assert!(ExportDomain::from_str("bogus").is_err());
    }

    #[test]
    fn test_domain_resource_types() {
        assert_eq!(ExportDomain::Patients.resource_type(), "Patient");
        assert_eq!(ExportDomain::Notes.resource_type(), "DocumentReference");
        assert_eq!(ExportDomain::Appointments.resource_type(), "Appointment");
        assert_eq!(ExportDomain::Workers.resource_type(), "Practitioner");
        assert_eq!(ExportDomain::Alerts.resource_type(), "Patient");
    }

    #[test]
    fn test_patient_record_values_in_column_order() {
        let record = ExportRecord::Patient(PatientRecord {
            patient_id: "p1".to_string(),
            last_name: "Doe".to_string(),
            first_name: "Jane".to_string(),
            middle_initial: "Q".to_string(),
            street: "1 Main St".to_string(),
            city: "Wichita Falls".to_string(),
            state: "TX".to_string(),
            zip: "76301".to_string(),
            county: "Wichita".to_string(),
            phone: "940-555-0100".to_string(),
        });
        let values = record.values();
        assert_eq!(values[0], "p1");
        assert_eq!(values[1], "Doe");
        assert_eq!(values[9], "940-555-0100");
    }
}

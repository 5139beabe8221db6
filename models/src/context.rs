// models/src/context.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Denormalized patient/appointment snapshot cached between wizard steps.
/// Not a source of truth: every field comes from the HIS and the record is
/// overwritten wholesale on each write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physician_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<Value>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PatientContext {
    /// Partial update: fields set on `incoming` replace ours, unspecified
    /// fields are copied forward.
    pub fn merged_with(&self, incoming: &PatientContext) -> PatientContext {
        PatientContext {
            mpi: incoming.mpi.clone().or_else(|| self.mpi.clone()),
            patient_id: incoming.patient_id.clone().or_else(|| self.patient_id.clone()),
            appointment_id: incoming
                .appointment_id
                .clone()
                .or_else(|| self.appointment_id.clone()),
            encounter_id: incoming
                .encounter_id
                .clone()
                .or_else(|| self.encounter_id.clone()),
            physician_id: incoming
                .physician_id
                .clone()
                .or_else(|| self.physician_id.clone()),
            patient_name: incoming
                .patient_name
                .clone()
                .or_else(|| self.patient_name.clone()),
            phone: incoming.phone.clone().or_else(|| self.phone.clone()),
            date_of_birth: incoming
                .date_of_birth
                .clone()
                .or_else(|| self.date_of_birth.clone()),
            insurance: incoming.insurance.clone().or_else(|| self.insurance.clone()),
            updated_at: Utc::now(),
        }
    }

    pub fn has_any_key(&self) -> bool {
        self.mpi.is_some() || self.patient_id.is_some() || self.appointment_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_copy_forward_unspecified_fields_on_merge() {
        let existing = PatientContext {
            mpi: Some("MPI-1".to_string()),
            patient_id: Some("100".to_string()),
            encounter_id: Some("E-7".to_string()),
            ..Default::default()
        };
        let incoming = PatientContext {
            patient_id: Some("100".to_string()),
            physician_id: Some("D-3".to_string()),
            ..Default::default()
        };
        let merged = existing.merged_with(&incoming);
        assert_eq!(merged.mpi.as_deref(), Some("MPI-1"));
        assert_eq!(merged.encounter_id.as_deref(), Some("E-7"));
        assert_eq!(merged.physician_id.as_deref(), Some("D-3"));
    }
}

// lib/src/keys.rs
// Key schema for the key-value store. Every key the broker touches is
// built here so the layout stays greppable in one place.

/// Oldest history items beyond this count are evicted per clinic.
pub const MAX_HISTORY_PER_CLINIC: usize = 50;
/// History items and their indexes expire after this window.
pub const HISTORY_ITEM_TTL_SECS: u64 = 30 * 24 * 3600;
/// Context-cache snapshots expire after this window.
pub const CONTEXT_TTL_SECS: u64 = 24 * 3600;
/// The polling-task list key expires this long after its last write.
pub const POLLING_TASKS_TTL_SECS: u64 = 3600;
/// Polling tasks older than this are dropped whenever the list is read.
pub const POLLING_TASK_MAX_AGE_SECS: i64 = 1800;

pub const POLLING_TASKS_KEY: &str = "eligibility:polling:tasks";

pub fn clinic_config(clinic_id: &str) -> String {
    format!("clinic:config:{}", clinic_id)
}

pub fn tpa_config(clinic_id: &str, code: &str) -> String {
    format!("clinic:tpa:{}:{}", clinic_id, code)
}

pub fn tpa_index(clinic_id: &str) -> String {
    format!("clinic:tpa:{}:index", clinic_id)
}

pub fn doctors(clinic_id: &str) -> String {
    format!("clinic:doctor:{}", clinic_id)
}

pub fn networks(clinic_id: &str, tpa_code: &str) -> String {
    format!("clinic:network:{}:{}", clinic_id, tpa_code)
}

pub fn plans(clinic_id: &str, tpa_code: &str) -> String {
    format!("clinic:plan:{}:{}", clinic_id, tpa_code)
}

pub fn payers(clinic_id: &str, tpa_code: &str) -> String {
    format!("clinic:payer:{}:{}", clinic_id, tpa_code)
}

pub fn mantys_networks(clinic_id: &str, tpa_code: &str) -> String {
    format!("clinic:mantys_network:{}:{}", clinic_id, tpa_code)
}

pub fn plan_mapping(clinic_id: &str, tpa_code: &str, mapping_id: &str) -> String {
    format!("clinic:plan_mapping:{}:{}:{}", clinic_id, tpa_code, mapping_id)
}

pub fn plan_mapping_index(clinic_id: &str, tpa_code: &str) -> String {
    format!("clinic:plan_mapping:{}:{}:index", clinic_id, tpa_code)
}

pub fn history_item(id: &str) -> String {
    format!("eligibility:history:item:{}", id)
}

pub fn history_clinic_index(clinic_id: &str) -> String {
    format!("eligibility:history:clinic:{}", clinic_id)
}

pub fn history_task_index(task_id: &str) -> String {
    format!("eligibility:history:task:{}", task_id)
}

pub fn history_patient_index(clinic_id: &str, patient_id: &str) -> String {
    format!("eligibility:history:patient:{}:{}", clinic_id, patient_id)
}

pub fn history_appointment_index(clinic_id: &str, appointment_id: &str) -> String {
    format!("eligibility:history:appointment:{}:{}", clinic_id, appointment_id)
}

pub fn context_by_mpi(mpi: &str) -> String {
    format!("patient:mpi:{}", mpi)
}

pub fn context_by_patient(patient_id: &str) -> String {
    format!("patient:id:{}", patient_id)
}

pub fn context_by_appointment(appointment_id: &str) -> String {
    format!("appointment:{}", appointment_id)
}

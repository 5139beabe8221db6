// server/src/api/handlers_patient.rs
// Patient search and context-cache endpoints. Search calls are thin
// proxies to the HIS; insurance-details additionally mirrors its result
// into the context cache through the background queue.

use serde::Deserialize;
use serde_json::Value;
use warp::http::StatusCode;

use lib::background::BackgroundJob;
use models::context::PatientContext;

use super::replies::{error_reply, missing_fields, ok_json, status_json, ApiReply};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    #[serde(default)]
    pub context: Option<PatientContext>,
    #[serde(default)]
    pub mpi: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatientIdRequest {
    #[serde(default)]
    pub patient_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MpiRequest {
    #[serde(default)]
    pub mpi: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    #[serde(default)]
    pub phone: Option<String>,
}

/// The HIS only accepts numeric identifiers; both JSON numbers and numeric
/// strings are tolerated on our side.
pub fn parse_numeric_id(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// POST /patient/context — write when a `context` object is supplied, read
/// by identifier otherwise.
pub async fn context(body: ContextRequest, state: AppState) -> ApiReply {
    if let Some(context) = body.context {
        return match state.contexts.store(&context).await {
            Ok(()) => Ok(ok_json(&context)),
            Err(e) => Ok(error_reply(&e)),
        };
    }

    let probe = PatientContext {
        mpi: body.mpi,
        patient_id: body.patient_id,
        appointment_id: body.appointment_id,
        ..Default::default()
    };
    if !probe.has_any_key() {
        return Ok(missing_fields(&["mpi", "patient_id", "appointment_id"]));
    }
    match state.contexts.find(&probe).await {
        Ok(Some(found)) => Ok(ok_json(&found)),
        Ok(None) => Ok(status_json(
            &serde_json::json!({"error": "context not found"}),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/context/update — partial update, unspecified fields are
/// copied forward from the cached snapshot.
pub async fn context_update(body: PatientContext, state: AppState) -> ApiReply {
    if !body.has_any_key() {
        return Ok(missing_fields(&["mpi", "patient_id", "appointment_id"]));
    }
    match state.contexts.update(&body).await {
        Ok(merged) => Ok(ok_json(&merged)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/details
pub async fn details(body: PatientIdRequest, state: AppState) -> ApiReply {
    let Some(patient_id) = parse_numeric_id(body.patient_id.as_ref()) else {
        return Ok(missing_fields(&["patient_id"]));
    };
    match state.his.patient_details(patient_id).await {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/search-mpi
pub async fn search_mpi(body: MpiRequest, state: AppState) -> ApiReply {
    let Some(mpi) = body.mpi.filter(|v| is_digits(v)) else {
        return Ok(missing_fields(&["mpi"]));
    };
    match state.his.search_by_mpi(&mpi).await {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/search-phone
pub async fn search_phone(body: PhoneRequest, state: AppState) -> ApiReply {
    let Some(phone) = body.phone.filter(|v| is_digits(v)) else {
        return Ok(missing_fields(&["phone"]));
    };
    match state.his.search_by_phone(&phone).await {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/search-appointments
pub async fn search_appointments(body: PatientIdRequest, state: AppState) -> ApiReply {
    let Some(patient_id) = parse_numeric_id(body.patient_id.as_ref()) else {
        return Ok(missing_fields(&["patient_id"]));
    };
    match state.his.search_appointments(patient_id).await {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /patient/insurance-details — proxies the HIS lookup and mirrors
/// the result into the context cache. The mirror is eventually consistent;
/// the reply never waits on it.
pub async fn insurance_details(body: PatientIdRequest, state: AppState) -> ApiReply {
    let Some(patient_id) = parse_numeric_id(body.patient_id.as_ref()) else {
        return Ok(missing_fields(&["patient_id"]));
    };
    match state.his.insurance_details(patient_id).await {
        Ok(envelope) => {
            state
                .background
                .enqueue(BackgroundJob::UpdateContext(PatientContext {
                    patient_id: Some(patient_id.to_string()),
                    insurance: Some(Value::Array(envelope.body.data.clone())),
                    ..Default::default()
                }));
            Ok(ok_json(&envelope))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

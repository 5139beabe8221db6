// server/src/api/handlers_aster.rs
// Write-side proxies to the HIS. Each requires patientId + appointmentId,
// resolves missing encounter/physician ids from the context cache, and
// forwards a fixed-shape payload.

use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;

use models::context::PatientContext;
use models::errors::BrokerError;
use models::his::{SaveEligibilityOrderRequest, SavePolicyRequest, UploadAttachmentRequest};
use models::tpa::TpaConfig;

use super::handlers_clinic_config::mapping_diagnostics;
use super::replies::{error_reply, missing_fields, ok_json, status_json, ApiReply};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveOrderRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(flatten)]
    pub order: SaveEligibilityOrderRequest,
}

#[derive(Debug, Deserialize)]
pub struct SavePolicyBody {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(flatten)]
    pub policy: SavePolicyRequest,
}

/// Context lookup for a write call: appointment first (most specific),
/// then patient. A miss is fine; the caller falls back to request fields.
async fn lookup_context(
    state: &AppState,
    patient_id: Option<i64>,
    appointment_id: Option<i64>,
) -> Option<PatientContext> {
    if let Some(appointment_id) = appointment_id {
        match state
            .contexts
            .get_by_appointment(&appointment_id.to_string())
            .await
        {
            Ok(Some(context)) => return Some(context),
            Ok(None) => {}
            Err(e) => log::warn!("Context lookup failed: {}", e),
        }
    }
    if let Some(patient_id) = patient_id {
        match state.contexts.get_by_patient(&patient_id.to_string()).await {
            Ok(Some(context)) => return Some(context),
            Ok(None) => {}
            Err(e) => log::warn!("Context lookup failed: {}", e),
        }
    }
    None
}

async fn lookup_config(
    state: &AppState,
    clinic_id: Option<&str>,
    tpa_code: Option<&str>,
) -> Result<Option<TpaConfig>, BrokerError> {
    let (Some(clinic_id), Some(tpa_code)) = (state.clinic_id(clinic_id), tpa_code) else {
        return Ok(None);
    };
    state.tpa.get(&clinic_id, tpa_code).await
}

/// 400 diagnostic for a config that cannot back an eligibility submission:
/// names the fields that were checked and what was found.
fn mapping_error(tpa_code: Option<&str>, config: Option<&TpaConfig>) -> ApiReply {
    let diagnostics = config.map(mapping_diagnostics);
    Ok(status_json(
        &json!({
            "error": "missing insurance mapping ID",
            "tpa_code": tpa_code,
            "diagnostics": diagnostics,
        }),
        StatusCode::BAD_REQUEST,
    ))
}

/// POST /aster/save-eligibility-order
pub async fn save_order(body: SaveOrderRequest, state: AppState) -> ApiReply {
    let request = body.order;
    if request.patient_id.is_none() || request.appointment_id.is_none() {
        return Ok(missing_fields(&["patient_id", "appointment_id"]));
    }

    let config = match lookup_config(&state, body.clinic_id.as_deref(), request.tpa_code.as_deref())
        .await
    {
        Ok(config) => config,
        Err(e) => return Ok(error_reply(&e)),
    };
    if config
        .as_ref()
        .and_then(|c| c.hospital_insurance_mapping_id)
        .is_none()
    {
        return mapping_error(request.tpa_code.as_deref(), config.as_ref());
    }

    let context = lookup_context(&state, request.patient_id, request.appointment_id).await;
    match state
        .his
        .save_eligibility_order(&request, context.as_ref(), config.as_ref())
        .await
    {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /aster/upload-attachment
pub async fn upload_attachment(body: UploadAttachmentRequest, state: AppState) -> ApiReply {
    if body.patient_id.is_none() || body.appointment_id.is_none() {
        return Ok(missing_fields(&["patient_id", "appointment_id"]));
    }
    let context = lookup_context(&state, body.patient_id, body.appointment_id).await;
    match state.his.upload_attachment(&body, context.as_ref()).await {
        Ok(result) => Ok(ok_json(&result)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /aster/save-policy — the TPA config's mapping id wins over any
/// patient-derived fallback carried on the request.
pub async fn save_policy(body: SavePolicyBody, state: AppState) -> ApiReply {
    let request = body.policy;
    if request.patient_id.is_none() || request.appointment_id.is_none() {
        return Ok(missing_fields(&["patient_id", "appointment_id"]));
    }

    let config = match lookup_config(&state, body.clinic_id.as_deref(), request.tpa_code.as_deref())
        .await
    {
        Ok(config) => config,
        Err(e) => return Ok(error_reply(&e)),
    };
    if config
        .as_ref()
        .and_then(|c| c.hospital_insurance_mapping_id)
        .or(request.insurance_mapping_id)
        .is_none()
    {
        return mapping_error(request.tpa_code.as_deref(), config.as_ref());
    }

    match state.his.save_policy(&request, config.as_ref()).await {
        Ok(envelope) => Ok(ok_json(&envelope)),
        Err(e) => Ok(error_reply(&e)),
    }
}

// server/src/api/handlers_clinic_config.rs
// TPA configuration, plan-mapping, and reference-collection endpoints.

use serde::Deserialize;
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::Rejection;

use lib::clinic_collections::CollectionKind;
use lib::tpa_store::validate_tpa_config;
use models::errors::BrokerError;
use models::plan_mapping::{PlanMappingImport, PlanNetworkMapping};
use models::tpa::TpaConfig;

use super::replies::{error_reply, missing_fields, ok_json, status_json, ApiReply};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ClinicQuery {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub export: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TpaUpsertRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub require_mapping: bool,
    #[serde(default)]
    pub skip_validation: bool,
    pub config: TpaConfig,
}

#[derive(Debug, Deserialize)]
pub struct ClinicBody {
    #[serde(default)]
    pub clinic_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TpaMappingRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub mapping: Option<models::his::InsuranceMapping>,
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub mappings: Vec<PlanMappingImport>,
}

#[derive(Debug, Deserialize)]
pub struct PlanMappingUpdateRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub set_default: bool,
    #[serde(default)]
    pub mapping: Option<PlanNetworkMapping>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionItemRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub item: Option<Value>,
}

/// GET /clinic-config/tpa
pub async fn tpa_list(query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    match state.tpa.list_all(&clinic_id).await {
        Ok(configs) => Ok(ok_json(&configs)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /clinic-config/tpa
pub async fn tpa_upsert(body: TpaUpsertRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    match state
        .tpa
        .upsert(
            &clinic_id,
            &body.config,
            body.require_mapping,
            body.skip_validation,
        )
        .await
    {
        Ok(report) if report.is_valid => Ok(ok_json(&report)),
        Ok(report) => Ok(status_json(&report, StatusCode::BAD_REQUEST)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// PUT /clinic-config/tpa/{code}
pub async fn tpa_update(code: String, body: TpaUpsertRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let mut config = body.config;
    // The path parameter is authoritative for the code.
    config.ins_code = Some(code);
    match state
        .tpa
        .upsert(
            &clinic_id,
            &config,
            body.require_mapping,
            body.skip_validation,
        )
        .await
    {
        Ok(report) if report.is_valid => Ok(ok_json(&report)),
        Ok(report) => Ok(status_json(&report, StatusCode::BAD_REQUEST)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// DELETE /clinic-config/tpa/{code}
pub async fn tpa_delete(code: String, query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    match state.tpa.delete(&clinic_id, &code).await {
        Ok(()) => Ok(ok_json(&json!({"deleted": code}))),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /clinic-config/tpa/repair
pub async fn tpa_repair(body: ClinicBody, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    match state.tpa.repair(&clinic_id).await {
        Ok(report) => Ok(ok_json(&report)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// GET /clinic-config/tpa/diagnose
pub async fn tpa_diagnose(query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    match state.tpa.diagnose(&clinic_id).await {
        Ok(findings) => Ok(ok_json(&findings)),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn apply_mapping(config: &mut TpaConfig, mapping: &models::his::InsuranceMapping) {
    config.hospital_insurance_mapping_id = mapping
        .hospital_insurance_mapping_id
        .or(config.hospital_insurance_mapping_id);
    config.insurance_id = mapping.insurance_id.or(config.insurance_id);
    config.insurance_type = mapping.insurance_type.or(config.insurance_type);
    if mapping.insurance_name.is_some() {
        config.insurance_name = mapping.insurance_name.clone();
    }
    if mapping.ins_payer.is_some() {
        config.ins_payer = mapping.ins_payer.clone();
    }
}

/// GET /clinic-config/tpa/mapping — returns the stored mapping fields for
/// a code; when the stored config is incomplete the HIS is asked (the one
/// retried upstream call) and the result is merged back into the config.
pub async fn tpa_mapping_get(query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Ok(missing_fields(&["code"]));
    };

    let mut config = match state.tpa.get(&clinic_id, &code).await {
        Ok(Some(config)) => config,
        Ok(None) => TpaConfig::new(&code),
        Err(e) => return Ok(error_reply(&e)),
    };

    if !config.eligibility_ready() {
        match state.his.fetch_insurance_mapping(&code).await {
            Ok(rows) => {
                if let Some(mapping) = rows.first() {
                    apply_mapping(&mut config, mapping);
                    if let Err(e) = state.tpa.upsert(&clinic_id, &config, false, false).await {
                        return Ok(error_reply(&e));
                    }
                }
            }
            Err(e) => return Ok(error_reply(&e)),
        }
    }
    Ok(ok_json(&config))
}

/// POST /clinic-config/tpa/mapping
pub async fn tpa_mapping_set(body: TpaMappingRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let (Some(code), Some(mapping)) = (body.code.filter(|c| !c.is_empty()), body.mapping) else {
        return Ok(missing_fields(&["code", "mapping"]));
    };

    let mut config = match state.tpa.get(&clinic_id, &code).await {
        Ok(Some(config)) => config,
        Ok(None) => TpaConfig::new(&code),
        Err(e) => return Ok(error_reply(&e)),
    };
    apply_mapping(&mut config, &mapping);
    match state.tpa.upsert(&clinic_id, &config, false, false).await {
        Ok(report) if report.is_valid => Ok(ok_json(&config)),
        Ok(report) => Ok(status_json(&report, StatusCode::BAD_REQUEST)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// DELETE /clinic-config/tpa/mapping — clears the mapping fields but keeps
/// the config record.
pub async fn tpa_mapping_clear(query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Ok(missing_fields(&["code"]));
    };
    let mut config = match state.tpa.get(&clinic_id, &code).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            return Ok(error_reply(&BrokerError::not_found("TPA config", &code)));
        }
        Err(e) => return Ok(error_reply(&e)),
    };
    config.hospital_insurance_mapping_id = None;
    config.insurance_id = None;
    config.insurance_type = None;
    config.insurance_name = None;
    config.ins_payer = None;
    match state.tpa.upsert(&clinic_id, &config, false, false).await {
        Ok(_) => Ok(ok_json(&config)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// GET /clinic-config/plan-mappings — JSON by default, CSV with
/// `?export=csv`.
pub async fn plan_mappings_get(
    query: ClinicQuery,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    use warp::Reply;

    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]).into_response());
    };
    let Some(tpa_code) = query.tpa_code.filter(|c| !c.is_empty()) else {
        return Ok(missing_fields(&["tpa_code"]).into_response());
    };

    if query.export.as_deref() == Some("csv") {
        return match state.mappings.export_csv(&clinic_id, &tpa_code).await {
            Ok(csv) => Ok(warp::reply::with_header(csv, "content-type", "text/csv").into_response()),
            Err(e) => Ok(error_reply(&e).into_response()),
        };
    }
    match state.mappings.list(&clinic_id, &tpa_code).await {
        Ok(mappings) => Ok(ok_json(&mappings).into_response()),
        Err(e) => Ok(error_reply(&e).into_response()),
    }
}

/// POST /clinic-config/plan-mappings — bulk import; a single create is a
/// batch of one.
pub async fn plan_mappings_import(body: BulkImportRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    if body.mappings.is_empty() {
        return Ok(missing_fields(&["mappings"]));
    }
    match state.mappings.bulk_import(&clinic_id, body.mappings).await {
        Ok(report) => Ok(ok_json(&report)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// PUT /clinic-config/plan-mappings — field update or default-setting.
pub async fn plan_mappings_update(body: PlanMappingUpdateRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };

    if body.set_default {
        let (Some(tpa_code), Some(id)) = (body.tpa_code.as_deref(), body.id.as_deref()) else {
            return Ok(missing_fields(&["tpa_code", "id"]));
        };
        return match state.mappings.set_default(&clinic_id, tpa_code, id).await {
            Ok(mapping) => Ok(ok_json(&mapping)),
            Err(e) => Ok(error_reply(&e)),
        };
    }

    let Some(mapping) = body.mapping else {
        return Ok(missing_fields(&["mapping"]));
    };
    match state.mappings.update(&clinic_id, &mapping).await {
        Ok(updated) => Ok(ok_json(&updated)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// DELETE /clinic-config/plan-mappings
pub async fn plan_mappings_delete(query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let (Some(tpa_code), Some(id)) = (query.tpa_code.as_deref(), query.id.as_deref()) else {
        return Ok(missing_fields(&["tpa_code", "id"]));
    };
    match state.mappings.delete(&clinic_id, tpa_code, id).await {
        Ok(()) => Ok(ok_json(&json!({"deleted": id}))),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn resolve_collection(segment: &str) -> Option<CollectionKind> {
    CollectionKind::from_path(segment)
}

fn unknown_collection(segment: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    status_json(
        &json!({"error": format!("unknown collection: {}", segment)}),
        StatusCode::NOT_FOUND,
    )
}

/// GET /clinic-config/{doctors|networks|plans|payers|mantys-networks}
pub async fn collection_list(segment: String, query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(kind) = resolve_collection(&segment) else {
        return Ok(unknown_collection(&segment));
    };
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let tpa_code = query.tpa_code.unwrap_or_default();
    if kind.needs_tpa_code() && tpa_code.is_empty() {
        return Ok(missing_fields(&["tpa_code"]));
    }
    match state.collections.list(kind, &clinic_id, &tpa_code).await {
        Ok(items) => Ok(ok_json(&items)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /clinic-config/{collection}
pub async fn collection_upsert(
    segment: String,
    body: CollectionItemRequest,
    state: AppState,
) -> ApiReply {
    let Some(kind) = resolve_collection(&segment) else {
        return Ok(unknown_collection(&segment));
    };
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let tpa_code = body.tpa_code.unwrap_or_default();
    if kind.needs_tpa_code() && tpa_code.is_empty() {
        return Ok(missing_fields(&["tpa_code"]));
    }
    let Some(item) = body.item else {
        return Ok(missing_fields(&["item"]));
    };
    match state
        .collections
        .upsert_item(kind, &clinic_id, &tpa_code, item)
        .await
    {
        Ok(items) => Ok(ok_json(&items)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// DELETE /clinic-config/{collection}
pub async fn collection_delete(segment: String, query: ClinicQuery, state: AppState) -> ApiReply {
    let Some(kind) = resolve_collection(&segment) else {
        return Ok(unknown_collection(&segment));
    };
    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let Some(id) = query.id.filter(|v| !v.is_empty()) else {
        return Ok(missing_fields(&["id"]));
    };
    let tpa_code = query.tpa_code.unwrap_or_default();
    if kind.needs_tpa_code() && tpa_code.is_empty() {
        return Ok(missing_fields(&["tpa_code"]));
    }
    match state
        .collections
        .delete_item(kind, &clinic_id, &tpa_code, &id)
        .await
    {
        Ok(items) => Ok(ok_json(&items)),
        Err(e) => Ok(error_reply(&e)),
    }
}

// Validation details for the strict upsert path live in lib::tpa_store;
// exposed here for the aster handlers' diagnostic payloads.
pub fn mapping_diagnostics(config: &TpaConfig) -> Value {
    let report = validate_tpa_config(config, true);
    json!({
        "checked": {
            "hospital_insurance_mapping_id": config.hospital_insurance_mapping_id,
            "insurance_id": config.insurance_id,
            "insurance_type": config.insurance_type,
            "insurance_name": config.insurance_name,
        },
        "missing_fields": report.missing_fields,
    })
}

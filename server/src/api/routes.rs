// server/src/api/routes.rs
// Composes the HTTP surface. Literal segments (tpa/mapping, tpa/repair,
// plan-mappings) are registered before the parameterized and generic
// collection routes so they are never captured as path parameters.

use std::convert::Infallible;

use warp::{Filter, Rejection, Reply};

use super::{
    handlers_aster, handlers_clinic_config, handlers_eligibility, handlers_patient, AppState,
};

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(1024 * 1024 * 16).and(warp::body::json())
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let patient = patient_routes(state.clone());
    let clinic_config = clinic_config_routes(state.clone());
    let eligibility = eligibility_routes(state);

    patient.or(clinic_config).or(eligibility).boxed()
}

fn patient_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let context = warp::path!("patient" / "context")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::context);

    let context_update = warp::path!("patient" / "context" / "update")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::context_update);

    let details = warp::path!("patient" / "details")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::details);

    let search_mpi = warp::path!("patient" / "search-mpi")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::search_mpi);

    let search_phone = warp::path!("patient" / "search-phone")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::search_phone);

    let search_appointments = warp::path!("patient" / "search-appointments")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_patient::search_appointments);

    let insurance_details = warp::path!("patient" / "insurance-details")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers_patient::insurance_details);

    context_update
        .or(context)
        .or(details)
        .or(search_mpi)
        .or(search_phone)
        .or(search_appointments)
        .or(insurance_details)
        .boxed()
}

fn clinic_config_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tpa_mapping_get = warp::path!("clinic-config" / "tpa" / "mapping")
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_mapping_get);

    let tpa_mapping_set = warp::path!("clinic-config" / "tpa" / "mapping")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_mapping_set);

    let tpa_mapping_clear = warp::path!("clinic-config" / "tpa" / "mapping")
        .and(warp::delete())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_mapping_clear);

    let tpa_repair = warp::path!("clinic-config" / "tpa" / "repair")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_repair);

    let tpa_diagnose = warp::path!("clinic-config" / "tpa" / "diagnose")
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_diagnose);

    let tpa_list = warp::path!("clinic-config" / "tpa")
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_list);

    let tpa_upsert = warp::path!("clinic-config" / "tpa")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_upsert);

    let tpa_update = warp::path!("clinic-config" / "tpa" / String)
        .and(warp::put())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_update);

    let tpa_delete = warp::path!("clinic-config" / "tpa" / String)
        .and(warp::delete())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::tpa_delete);

    let plan_mappings_get = warp::path!("clinic-config" / "plan-mappings")
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::plan_mappings_get);

    let plan_mappings_import = warp::path!("clinic-config" / "plan-mappings")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::plan_mappings_import);

    let plan_mappings_update = warp::path!("clinic-config" / "plan-mappings")
        .and(warp::put())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::plan_mappings_update);

    let plan_mappings_delete = warp::path!("clinic-config" / "plan-mappings")
        .and(warp::delete())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::plan_mappings_delete);

    let collection_list = warp::path!("clinic-config" / String)
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::collection_list);

    let collection_upsert = warp::path!("clinic-config" / String)
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_clinic_config::collection_upsert);

    let collection_delete = warp::path!("clinic-config" / String)
        .and(warp::delete())
        .and(warp::query())
        .and(with_state(state))
        .and_then(handlers_clinic_config::collection_delete);

    tpa_mapping_get
        .or(tpa_mapping_set)
        .or(tpa_mapping_clear)
        .or(tpa_repair)
        .or(tpa_diagnose)
        .or(tpa_list)
        .or(tpa_upsert)
        .or(tpa_update)
        .or(tpa_delete)
        .or(plan_mappings_get)
        .or(plan_mappings_import)
        .or(plan_mappings_update)
        .or(plan_mappings_delete)
        .or(collection_list)
        .or(collection_upsert)
        .or(collection_delete)
        .boxed()
}

fn eligibility_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let eligibility_check = warp::path!("mantys" / "eligibility-check")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::eligibility_check);

    let check_status = warp::path!("mantys" / "check-status")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::check_status);

    let history_get = warp::path!("eligibility-history")
        .and(warp::get())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::history_get);

    let history_create = warp::path!("eligibility-history")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::history_create);

    let history_update = warp::path!("eligibility-history")
        .and(warp::put())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::history_update);

    let history_delete = warp::path!("eligibility-history")
        .and(warp::delete())
        .and(warp::query())
        .and(with_state(state.clone()))
        .and_then(handlers_eligibility::history_delete);

    let save_order = warp::path!("aster" / "save-eligibility-order")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_aster::save_order);

    let upload_attachment = warp::path!("aster" / "upload-attachment")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers_aster::upload_attachment);

    let save_policy = warp::path!("aster" / "save-policy")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers_aster::save_policy);

    eligibility_check
        .or(check_status)
        .or(history_get)
        .or(history_create)
        .or(history_update)
        .or(history_delete)
        .or(save_order)
        .or(upload_attachment)
        .or(save_policy)
        .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use warp::http::StatusCode;

    use lib::config::AppConfig;
    use lib::storage_engine::InMemoryStorage;

    use super::*;

    fn test_state() -> AppState {
        let config = AppConfig {
            default_clinic_id: Some("clinic-1".to_string()),
            ..Default::default()
        };
        AppState::new(Arc::new(config), Arc::new(InMemoryStorage::new()))
    }

    fn ready_tpa_body(code: &str) -> Value {
        json!({
            "config": {
                "ins_code": code,
                "hospital_insurance_mapping_id": 55,
                "insurance_id": 7,
                "insurance_type": 2,
                "insurance_name": "Acme Health",
            }
        })
    }

    #[tokio::test]
    async fn should_round_trip_tpa_config_over_http() {
        let api = routes(test_state());

        let created = warp::test::request()
            .method("POST")
            .path("/clinic-config/tpa")
            .json(&ready_tpa_body("NAS"))
            .reply(&api)
            .await;
        assert_eq!(created.status(), StatusCode::OK);

        let listed = warp::test::request()
            .method("GET")
            .path("/clinic-config/tpa?clinic_id=clinic-1")
            .reply(&api)
            .await;
        assert_eq!(listed.status(), StatusCode::OK);
        let configs: Value = serde_json::from_slice(listed.body()).unwrap();
        assert_eq!(configs.as_array().unwrap().len(), 1);
        assert_eq!(configs[0]["ins_code"], "NAS");

        let deleted = warp::test::request()
            .method("DELETE")
            .path("/clinic-config/tpa/NAS?clinic_id=clinic-1")
            .reply(&api)
            .await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let listed = warp::test::request()
            .method("GET")
            .path("/clinic-config/tpa")
            .reply(&api)
            .await;
        let configs: Value = serde_json::from_slice(listed.body()).unwrap();
        assert!(configs.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_invalid_tpa_config_with_report() {
        let api = routes(test_state());
        let rejected = warp::test::request()
            .method("POST")
            .path("/clinic-config/tpa")
            .json(&json!({"config": {"insurance_name": "No Code"}}))
            .reply(&api)
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        let report: Value = serde_json::from_slice(rejected.body()).unwrap();
        assert_eq!(report["is_valid"], false);
        assert!(!report["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_import_and_export_plan_mappings() {
        let api = routes(test_state());

        let imported = warp::test::request()
            .method("POST")
            .path("/clinic-config/plan-mappings")
            .json(&json!({
                "mappings": [
                    {"tpa_code": "NAS", "lt_plan_id": 1, "lt_plan_name": "Gold", "mantys_network_name": "RN2", "is_default": true},
                    {"tpa_code": "NAS", "lt_plan_id": 2, "lt_plan_name": "Silver", "mantys_network_name": "RN2", "is_default": true},
                ]
            }))
            .reply(&api)
            .await;
        assert_eq!(imported.status(), StatusCode::OK);
        let report: Value = serde_json::from_slice(imported.body()).unwrap();
        assert_eq!(report["imported"], 2);
        assert_eq!(report["defaults_fixed"], 1);

        let csv = warp::test::request()
            .method("GET")
            .path("/clinic-config/plan-mappings?tpa_code=NAS&export=csv")
            .reply(&api)
            .await;
        assert_eq!(csv.status(), StatusCode::OK);
        assert_eq!(csv.headers()["content-type"], "text/csv");
        let body = String::from_utf8(csv.body().to_vec()).unwrap();
        assert!(body.lines().count() == 3);
    }

    #[tokio::test]
    async fn should_manage_history_records_over_http() {
        let api = routes(test_state());

        let created = warp::test::request()
            .method("POST")
            .path("/eligibility-history")
            .json(&json!({"patient_id": "100", "task_id": "t-9", "appointment_id": "200"}))
            .reply(&api)
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let item: Value = serde_json::from_slice(created.body()).unwrap();
        assert_eq!(item["status"], "pending");
        let id = item["id"].as_str().unwrap().to_string();

        let fetched = warp::test::request()
            .method("GET")
            .path("/eligibility-history?task_id=t-9")
            .reply(&api)
            .await;
        assert_eq!(fetched.status(), StatusCode::OK);

        let updated = warp::test::request()
            .method("PUT")
            .path("/eligibility-history")
            .json(&json!({"id": id, "status": "processing"}))
            .reply(&api)
            .await;
        assert_eq!(updated.status(), StatusCode::OK);
        let item: Value = serde_json::from_slice(updated.body()).unwrap();
        assert_eq!(item["status"], "processing");

        let deleted = warp::test::request()
            .method("DELETE")
            .path(&format!("/eligibility-history?id={}", id))
            .reply(&api)
            .await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = warp::test::request()
            .method("GET")
            .path("/eligibility-history?task_id=t-9")
            .reply(&api)
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_report_missing_fields_on_patient_search() {
        let api = routes(test_state());
        let rejected = warp::test::request()
            .method("POST")
            .path("/patient/details")
            .json(&json!({"patient_id": "not-a-number"}))
            .reply(&api)
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(rejected.body()).unwrap();
        assert_eq!(body["missing_fields"][0], "patient_id");
    }

    #[tokio::test]
    async fn should_store_and_read_context_over_http() {
        let api = routes(test_state());

        let stored = warp::test::request()
            .method("POST")
            .path("/patient/context")
            .json(&json!({"context": {"mpi": "12345", "patient_id": "100", "encounter_id": "E-7"}}))
            .reply(&api)
            .await;
        assert_eq!(stored.status(), StatusCode::OK);

        let read = warp::test::request()
            .method("POST")
            .path("/patient/context")
            .json(&json!({"patient_id": "100"}))
            .reply(&api)
            .await;
        assert_eq!(read.status(), StatusCode::OK);
        let context: Value = serde_json::from_slice(read.body()).unwrap();
        assert_eq!(context["mpi"], "12345");
        assert_eq!(context["encounter_id"], "E-7");

        let merged = warp::test::request()
            .method("POST")
            .path("/patient/context/update")
            .json(&json!({"patient_id": "100", "physician_id": "D-3"}))
            .reply(&api)
            .await;
        assert_eq!(merged.status(), StatusCode::OK);
        let context: Value = serde_json::from_slice(merged.body()).unwrap();
        assert_eq!(context["encounter_id"], "E-7");
        assert_eq!(context["physician_id"], "D-3");
    }

    #[tokio::test]
    async fn should_manage_reference_collections_over_http() {
        let api = routes(test_state());

        let added = warp::test::request()
            .method("POST")
            .path("/clinic-config/payers")
            .json(&json!({"tpa_code": "NAS", "item": {"id": "p1", "name": "Acme"}}))
            .reply(&api)
            .await;
        assert_eq!(added.status(), StatusCode::OK);

        let listed = warp::test::request()
            .method("GET")
            .path("/clinic-config/payers?tpa_code=NAS")
            .reply(&api)
            .await;
        let items: Value = serde_json::from_slice(listed.body()).unwrap();
        assert_eq!(items.as_array().unwrap().len(), 1);

        let unknown = warp::test::request()
            .method("GET")
            .path("/clinic-config/frobnicators?tpa_code=NAS")
            .reply(&api)
            .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_refuse_save_policy_without_mapping() {
        let api = routes(test_state());
        let rejected = warp::test::request()
            .method("POST")
            .path("/aster/save-policy")
            .json(&json!({"patient_id": 100, "appointment_id": 200, "tpa_code": "NAS"}))
            .reply(&api)
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(rejected.body()).unwrap();
        assert_eq!(body["error"], "missing insurance mapping ID");
    }
}

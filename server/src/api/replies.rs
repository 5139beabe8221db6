// server/src/api/replies.rs
// Unified reply shape for the API handlers, mirroring the error taxonomy:
// 400 validation with a field list, upstream status + raw body as details,
// 408 timeout, 404 not-found, 500 for configuration/internal failures.

use serde::Serialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Rejection;

use models::errors::BrokerError;

/// Unified success return type for the API handlers.
pub type ApiReply = Result<WithStatus<Json>, Rejection>;

pub fn ok_json<T: Serialize>(value: &T) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(value), StatusCode::OK)
}

pub fn status_json<T: Serialize>(value: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(value), status)
}

/// 400 with the list of required fields the request was missing.
pub fn missing_fields(fields: &[&str]) -> WithStatus<Json> {
    status_json(
        &json!({
            "error": "missing required fields",
            "missing_fields": fields,
        }),
        StatusCode::BAD_REQUEST,
    )
}

pub fn error_reply(err: &BrokerError) -> WithStatus<Json> {
    match err {
        BrokerError::ValidationError(message) | BrokerError::BusinessRule(message) => status_json(
            &json!({"error": message}),
            StatusCode::BAD_REQUEST,
        ),
        BrokerError::NotFound { entity, id } => status_json(
            &json!({"error": format!("{} not found", entity), "id": id}),
            StatusCode::NOT_FOUND,
        ),
        BrokerError::TimeoutError(message) => status_json(
            &json!({"error": message}),
            StatusCode::REQUEST_TIMEOUT,
        ),
        BrokerError::UpstreamError { status, body } => {
            let code = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
            status_json(
                &json!({"error": "upstream error", "status": status, "details": body}),
                code,
            )
        }
        BrokerError::ConfigurationError(message) => status_json(
            &json!({"error": message}),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        other => status_json(
            &json!({"error": other.to_string()}),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Reply;

    fn status_of(reply: WithStatus<Json>) -> StatusCode {
        reply.into_response().status()
    }

    #[test]
    fn should_map_timeouts_to_408() {
        let err = BrokerError::TimeoutError("HIS call timed out".to_string());
        assert_eq!(status_of(error_reply(&err)), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn should_forward_upstream_status_codes() {
        let err = BrokerError::UpstreamError {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(
            status_of(error_reply(&err)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn should_fall_back_to_502_for_invalid_upstream_status() {
        let err = BrokerError::UpstreamError {
            status: 9,
            body: String::new(),
        };
        assert_eq!(status_of(error_reply(&err)), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn should_map_business_rules_to_400() {
        let err = BrokerError::BusinessRule("no active insurance policy".to_string());
        assert_eq!(status_of(error_reply(&err)), StatusCode::BAD_REQUEST);
    }
}

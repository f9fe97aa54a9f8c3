use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use stockroom_infra::ServiceError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Like [`json_error`], with extra fields merged into the body.
fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    extra: Value,
) -> axum::response::Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    (status, axum::Json(body)).into_response()
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ServiceError::Unauthorized(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        ServiceError::Validation { field, .. } => json_error_with(
            StatusCode::BAD_REQUEST,
            "validation_error",
            message,
            json!({ "field": field }),
        ),
        ServiceError::InvalidCart { field, .. } => json_error_with(
            StatusCode::BAD_REQUEST,
            "invalid_cart",
            message,
            json!({ "field": field }),
        ),
        ServiceError::InsufficientStock {
            item_id,
            available,
            requested,
        } => json_error_with(
            StatusCode::BAD_REQUEST,
            "insufficient_stock",
            message,
            json!({
                "field": "cart",
                "item_id": item_id.to_string(),
                "available": available,
                "requested": requested,
            }),
        ),
        ServiceError::Discount(e) => json_error_with(
            StatusCode::BAD_REQUEST,
            "discount_error",
            message,
            json!({ "field": "discountCode", "kind": e.kind() }),
        ),
        ServiceError::IllegalTransition { from, to } => json_error_with(
            StatusCode::BAD_REQUEST,
            "illegal_transition",
            message,
            json!({ "from": from.as_str(), "to": to.as_str() }),
        ),
        ServiceError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", message),
        ServiceError::Duplicate(_) => json_error(StatusCode::CONFLICT, "duplicate", message),
        ServiceError::Conflict(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "conflict", message)
        }
        ServiceError::Timeout(_) => json_error(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            "checkout did not finish in time; no changes were made",
        ),
        ServiceError::Store(_) => {
            tracing::error!(error = %message, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn invalid_id(entity: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {entity} id"))
}

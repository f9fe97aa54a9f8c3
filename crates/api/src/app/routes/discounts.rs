use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;

use stockroom_discounts::DiscountId;
use stockroom_infra::{CreateDiscount, ServiceError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_discount).get(list_discounts))
        .route("/validate", post(validate_discount))
        .route("/:id/deactivate", post(deactivate_discount))
}

/// Preview a code against a cart total. A code that does not apply is a
/// normal answer here, so it comes back as `200` with `isValid: false`.
pub async fn validate_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ValidateDiscountRequest>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    let quote = services
        .discounts
        .validate(&actor, &body.code, body.cart_total, body.item_count)
        .await;

    match quote {
        Ok(quote) => {
            let final_total = body.cart_total.saturating_sub(quote.discount_amount);
            (
                StatusCode::OK,
                Json(json!({
                    "isValid": true,
                    "discountAmount": quote.discount_amount.minor_units(),
                    "finalTotal": final_total.minor_units(),
                    "discount": dto::discount_to_json(&quote.discount),
                })),
            )
                .into_response()
        }
        Err(ServiceError::Discount(e)) => (
            StatusCode::OK,
            Json(json!({
                "isValid": false,
                "reason": e.kind(),
                "message": e.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateDiscountRequest>,
) -> axum::response::Response {
    let rule = match body.rule() {
        Ok(rule) => rule,
        Err(resp) => return resp,
    };
    let conditions = body.conditions();

    let actor = authz::actor(&tenant, &principal);
    let request = CreateDiscount {
        code: body.code,
        description: body.description,
        rule,
        conditions,
    };

    match services.discounts.create(&actor, request).await {
        Ok(discount) => (StatusCode::CREATED, Json(dto::discount_to_json(&discount))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_discounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    match services.discounts.list(&actor).await {
        Ok(discounts) => {
            let out: Vec<_> = discounts.iter().map(dto::discount_to_json).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn deactivate_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let discount_id: DiscountId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("discount"),
    };

    let actor = authz::actor(&tenant, &principal);
    match services.discounts.deactivate(&actor, discount_id).await {
        Ok(discount) => (StatusCode::OK, Json(dto::discount_to_json(&discount))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

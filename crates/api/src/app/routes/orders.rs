use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use stockroom_infra::CheckoutRequest;
use stockroom_orders::{OrderId, OrderStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(checkout).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
}

/// Place an order.
///
/// The checkout runs on its own task so a client that disconnects cannot cut
/// a commit short. The deadline is enforced inside the orchestrator, before
/// commit.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    let request = CheckoutRequest {
        customer: body.customer,
        items: body.cart,
        discount_code: body.discount_code,
    };

    let task = tokio::spawn(async move { services.checkout.checkout(&actor, request).await });

    match task.await {
        Ok(Ok(order)) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Ok(Err(e)) => errors::service_error_to_response(e),
        Err(e) => {
            tracing::error!(error = %e, "checkout task failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "checkout failed")
        }
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    match services.orders.list(&actor).await {
        Ok(orders) => {
            let out: Vec<_> = orders.iter().map(dto::order_to_json).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("order"),
    };

    let actor = authz::actor(&tenant, &principal);
    match services.orders.get(&actor, order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("order"),
    };

    let status: OrderStatus = match body.status.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_status",
                "status must be one of: Processing, Shipped, Delivered, Cancelled, Refunded",
            );
        }
    };

    let actor = authz::actor(&tenant, &principal);
    match services.orders.update_status(&actor, order_id, status).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

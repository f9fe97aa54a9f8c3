use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;

use stockroom_inventory::{InventoryItemId, LowStockPolicy, MovementKind};
use stockroom_infra::{CreateItem, StockChange};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/items", post(create_item).get(list_items))
        .route("/items/:id", get(get_item))
        .route("/items/:id/price", put(reprice_item))
        .route("/items/:id/restock", post(restock_item))
        .route("/items/:id/adjust", post(adjust_stock))
        .route("/items/:id/movements", get(list_movements))
        .route("/low-stock", get(low_stock))
}

fn parse_item_id(id: &str) -> Result<InventoryItemId, axum::response::Response> {
    id.parse().map_err(|_| errors::invalid_id("item"))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    let request = CreateItem {
        sku: body.sku,
        name: body.name,
        category: body.category,
        unit_price: body.unit_price,
        opening_quantity: body.quantity,
        low_stock_threshold: body.low_stock_threshold,
    };

    match services.ledger.create_item(&actor, request).await {
        Ok(item) => (StatusCode::CREATED, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = authz::actor(&tenant, &principal);
    match services.ledger.list_items(&actor).await {
        Ok(items) => {
            let out: Vec<_> = items.iter().map(dto::item_to_json).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor = authz::actor(&tenant, &principal);
    match services.ledger.get_item(&actor, item_id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reprice_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RepriceRequest>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor = authz::actor(&tenant, &principal);
    match services.ledger.reprice(&actor, item_id, body.unit_price).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn restock_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RestockRequest>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor = authz::actor(&tenant, &principal);
    let change = StockChange {
        item_id,
        quantity: body.quantity,
        kind: MovementKind::StockIn,
        reason: body.reason,
        related_order_id: None,
    };

    match services.ledger.increase_stock(&actor, change).await {
        Ok(movement) => (StatusCode::OK, Json(dto::movement_to_json(&movement))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor = authz::actor(&tenant, &principal);
    match services
        .ledger
        .adjust(&actor, item_id, body.delta, body.kind, body.reason)
        .await
    {
        Ok(movement) => (StatusCode::OK, Json(dto::movement_to_json(&movement))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor = authz::actor(&tenant, &principal);
    match services.ledger.movements_for(&actor, item_id).await {
        Ok(movements) => {
            let out: Vec<_> = movements.iter().map(dto::movement_to_json).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LowStockQuery>,
) -> axum::response::Response {
    let policy = match query.threshold {
        Some(threshold) => LowStockPolicy::Fixed(threshold),
        None => LowStockPolicy::ItemThreshold,
    };

    let actor = authz::actor(&tenant, &principal);
    match services.ledger.low_stock(&actor, policy).await {
        Ok(items) => {
            let out: Vec<_> = items.map(|item| dto::item_to_json(&item)).collect();
            (StatusCode::OK, Json(json!({ "items": out }))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

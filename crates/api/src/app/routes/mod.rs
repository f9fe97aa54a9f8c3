use axum::{Router, routing::get};

pub mod discounts;
pub mod inventory;
pub mod orders;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/discounts", discounts::router())
        .nest("/inventory", inventory::router())
}

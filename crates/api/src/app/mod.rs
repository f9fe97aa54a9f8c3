//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the infra services handlers call
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request bodies and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use stockroom_infra::{AppConfig, Store};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let store = services::build_store(config).await?;
    Ok(build_app_with_store(config, store))
}

/// Router over an already-built store.
pub fn build_app_with_store(config: &AppConfig, store: Arc<dyn Store>) -> Router {
    let jwt = Arc::new(middleware::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::AppServices::new(store, &config.checkout));

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

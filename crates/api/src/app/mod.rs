//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring (sequence store, record store, job queue)
//! - `directory.rs`: back-office entities that carry minted codes
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use tablepos_infra::PipelineConfig;

use crate::middleware;

pub mod directory;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServiceError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &PipelineConfig) -> Result<(Router, Arc<AppServices>), ServiceError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok((router(services.clone()), services))
}

/// Router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    let context_state = middleware::ContextState {
        request_timeout: services.request_timeout(),
    };

    // Scoped routes: require the tenant/store/user headers.
    let scoped = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            context_state,
            middleware::context_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        .layer(ServiceBuilder::new())
}

use axum::Router;

pub mod entities;
pub mod exports;
pub mod system;

/// Router for all context-scoped (tenant/store/user) endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/exports", exports::router())
        .merge(entities::router())
}

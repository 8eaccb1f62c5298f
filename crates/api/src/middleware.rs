use std::time::Duration;

use axum::{extract::State, middleware::Next, response::Response};

use crate::context::context_from_headers;

#[derive(Debug, Clone, Copy)]
pub struct ContextState {
    pub request_timeout: Duration,
}

/// Resolve the request context from headers and start its deadline.
pub async fn context_middleware(
    State(state): State<ContextState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let ctx = context_from_headers(req.headers())
        .map_err(|rejection| rejection.into_response())?
        .with_timeout(state.request_timeout);

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

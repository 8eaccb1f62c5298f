use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use tablepos_core::{JobId, RequestContext};
use tablepos_export::{ExportFilter, ExportType};
use tablepos_infra::jobs::JobStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:export_type", post(create_export))
        .route("/dead-letters", get(list_dead_letters))
        .route("/jobs/:job_id", get(get_export_job))
        .route("/jobs/:job_id/retry", post(retry_export_job))
}

/// Most dead letters returned by one listing.
const DEAD_LETTER_LIMIT: usize = 100;

fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_job_id", "job id must be a UUID")
    })
}

/// Snapshot the matching rows and queue one job per page.
pub async fn create_export(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(export_type): Path<String>,
    Json(body): Json<dto::ExportRequest>,
) -> axum::response::Response {
    let export_type: ExportType = match export_type.parse() {
        Ok(t) => t,
        Err(e) => return errors::export_error_to_response(e),
    };

    let mut filter = ExportFilter::new(export_type, ctx.store_id(), body.start_date, body.end_date);
    if let Some(stall_id) = body.stall_id {
        filter = filter.with_stall(stall_id);
    }
    if let Some(status) = body.status {
        filter = filter.with_status(status);
    }

    match services.exports().export(&ctx, filter).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(dto::ExportAcceptedResponse::from(receipt)),
        )
            .into_response(),
        Err(e) => {
            warn!(export_type = %export_type, error = %e, "export request failed");
            errors::export_error_to_response(e)
        }
    }
}

pub async fn get_export_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().get(ctx.tenant_id(), job_id) {
        Ok(Some(job)) => (StatusCode::OK, Json(dto::ExportJobResponse::from(job))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// Oldest first, capped at `DEAD_LETTER_LIMIT`.
pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    match services.jobs().list_dead_letters(ctx.tenant_id(), DEAD_LETTER_LIMIT) {
        Ok(entries) => {
            let items = entries
                .into_iter()
                .map(dto::DeadLetterResponse::from)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// Requeue a dead-lettered page with a fresh attempt budget.
pub async fn retry_export_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&job_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().retry_dead_letter(ctx.tenant_id(), job_id) {
        Ok(job) => {
            info!(job_id = %job.id, "dead-lettered export page requeued");
            (StatusCode::ACCEPTED, Json(dto::ExportJobResponse::from(job))).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

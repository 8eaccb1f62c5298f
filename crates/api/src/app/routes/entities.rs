use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::info;

use tablepos_core::RequestContext;
use tablepos_sequence::{BusinessCode, mint_then_persist};

use crate::app::directory::BackOfficeEntity;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/departments", post(create_department).get(list_departments))
        .route("/roles", post(create_role).get(list_roles))
        .route("/tax-fees", post(create_tax_fee).get(list_tax_fees))
        .route("/users", post(create_user).get(list_users))
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateEntityRequest>,
) -> axum::response::Response {
    create_entity(services, ctx, BusinessCode::Department, body).await
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateEntityRequest>,
) -> axum::response::Response {
    create_entity(services, ctx, BusinessCode::Role, body).await
}

pub async fn create_tax_fee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateEntityRequest>,
) -> axum::response::Response {
    create_entity(services, ctx, BusinessCode::TaxFee, body).await
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::CreateEntityRequest>,
) -> axum::response::Response {
    create_entity(services, ctx, BusinessCode::User, body).await
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    list_entities(services, ctx, BusinessCode::Department)
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    list_entities(services, ctx, BusinessCode::Role)
}

pub async fn list_tax_fees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    list_entities(services, ctx, BusinessCode::TaxFee)
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    list_entities(services, ctx, BusinessCode::User)
}

async fn create_entity(
    services: Arc<AppServices>,
    ctx: RequestContext,
    kind: BusinessCode,
    body: dto::CreateEntityRequest,
) -> axum::response::Response {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_params", "name must not be empty");
    }

    // The entity is only written once a code exists.
    let generator = services.minter().generator(kind);
    let created = mint_then_persist(generator.as_ref(), &ctx, |code| async move {
        services
            .directory()
            .insert(BackOfficeEntity::new(kind, code, name, &ctx))
    })
    .await;

    match created {
        Ok(entity) => {
            info!(kind = ?kind, code = %entity.code, "entity created");
            (StatusCode::CREATED, Json(dto::EntityResponse::from(entity))).into_response()
        }
        Err(e) => errors::directory_error_to_response(e),
    }
}

fn list_entities(
    services: Arc<AppServices>,
    ctx: RequestContext,
    kind: BusinessCode,
) -> axum::response::Response {
    match services.directory().list(ctx.tenant_id(), kind) {
        Ok(entities) => {
            let items = entities
                .into_iter()
                .map(dto::EntityResponse::from)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::directory_error_to_response(e),
    }
}

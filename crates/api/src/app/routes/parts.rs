use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use stockroom_core::PartId;
use stockroom_inventory::{NewPart, PartPatch};

use crate::app::extract::ApiJson;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_parts).post(create_part))
        .route("/low-stock", get(low_stock_parts))
        .route("/:id", get(get_part).patch(update_part))
        .route("/:id/quantity", put(set_quantity))
}

pub async fn create_part(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    ApiJson(body): ApiJson<NewPart>,
) -> axum::response::Response {
    match services.ledger().create_part(body, actor.actor_id()).await {
        Ok(part) => (StatusCode::CREATED, Json(part)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_parts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger().parts().await {
        Ok(parts) => Json(parts).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn low_stock_parts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger().low_stock_parts().await {
        Ok(parts) => Json(parts).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_part(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PartId = match dto::parse_id(&id, "part id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().part(id).await {
        Ok(part) => Json(part).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_part(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PartPatch>,
) -> axum::response::Response {
    let id: PartId = match dto::parse_id(&id, "part id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().update_part(id, body, actor.actor_id()).await {
        Ok(part) => Json(part).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Inventory adjustment: overwrite the on-hand count.
pub async fn set_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::SetQuantityRequest>,
) -> axum::response::Response {
    let id: PartId = match dto::parse_id(&id, "part id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger()
        .set_part_quantity(id, body.quantity, actor.actor_id())
        .await
    {
        Ok(part) => Json(part).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

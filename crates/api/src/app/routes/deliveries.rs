use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use stockroom_core::DeliveryId;
use stockroom_infra::{NewBatch, NewDelivery};
use stockroom_inventory::RecordPatch;

use crate::app::extract::ApiJson;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_deliveries).post(create_delivery))
        .route("/batch", post(create_batch))
        .route(
            "/:id",
            get(get_delivery)
                .patch(update_delivery)
                .delete(delete_delivery),
        )
        .route("/:id/confirm", post(confirm_delivery))
        .route("/:id/cancel", post(cancel_delivery))
}

pub async fn create_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    ApiJson(body): ApiJson<NewDelivery>,
) -> axum::response::Response {
    match services.ledger().create_delivery(body, actor.actor_id()).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    ApiJson(body): ApiJson<NewBatch>,
) -> axum::response::Response {
    match services.ledger().create_batch(body, actor.actor_id()).await {
        Ok(records) => (StatusCode::CREATED, Json(records)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_deliveries(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::DeliveryQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.ledger().deliveries(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DeliveryId = match dto::parse_id(&id, "delivery id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().delivery(id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RecordPatch>,
) -> axum::response::Response {
    let id: DeliveryId = match dto::parse_id(&id, "delivery id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger()
        .update_delivery(id, body, actor.actor_id())
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn delete_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DeliveryId = match dto::parse_id(&id, "delivery id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().delete_delivery(id, actor.actor_id()).await {
        Ok(deleted) => Json(json!({ "id": id.to_string(), "deleted": deleted })).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Body is optional; `{"signature": "..."}` records the recipient's signature.
pub async fn confirm_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ConfirmRequest>>,
) -> axum::response::Response {
    let id: DeliveryId = match dto::parse_id(&id, "delivery id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let signature = body.and_then(|Json(b)| b.signature);

    match services
        .ledger()
        .confirm_delivery(id, signature, actor.actor_id())
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn cancel_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DeliveryId = match dto::parse_id(&id, "delivery id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().cancel_delivery(id, actor.actor_id()).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

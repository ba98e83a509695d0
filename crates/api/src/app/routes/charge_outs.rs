use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use stockroom_core::ChargeOutId;
use stockroom_infra::NewChargeOut;
use stockroom_inventory::RecordPatch;

use crate::app::extract::ApiJson;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_charge_outs).post(create_charge_out))
        .route(
            "/:id",
            get(get_charge_out)
                .patch(update_charge_out)
                .delete(delete_charge_out),
        )
}

pub async fn create_charge_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    ApiJson(body): ApiJson<NewChargeOut>,
) -> axum::response::Response {
    match services
        .ledger()
        .create_charge_out(body, actor.actor_id())
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_charge_outs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ChargeOutQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.ledger().charge_outs(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_charge_out(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ChargeOutId = match dto::parse_id(&id, "charge-out id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger().charge_out(id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_charge_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RecordPatch>,
) -> axum::response::Response {
    let id: ChargeOutId = match dto::parse_id(&id, "charge-out id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger()
        .update_charge_out(id, body, actor.actor_id())
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn delete_charge_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ChargeOutId = match dto::parse_id(&id, "charge-out id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger()
        .delete_charge_out(id, actor.actor_id())
        .await
    {
        Ok(deleted) => Json(json!({ "id": id.to_string(), "deleted": deleted })).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use stockroom_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        LedgerError::InsufficientStock {
            part_id,
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!(
                    "insufficient stock for part {part_id}: requested {requested}, available {available}"
                ),
                "part_id": part_id.to_string(),
                "requested": requested,
                "available": available,
                "shortfall": requested - available,
            })),
        )
            .into_response(),
        LedgerError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LedgerError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        LedgerError::Storage(store_err) => {
            error!(error = %store_err, "request failed on storage");
            if store_err.is_retryable() {
                json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_unavailable",
                    "storage is temporarily unavailable; retry the request",
                )
            } else {
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "internal storage error",
                )
            }
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::PartId;
    use stockroom_infra::StoreError;

    #[test]
    fn status_codes_follow_the_error_kind() {
        let cases = [
            (LedgerError::NotFound("part"), StatusCode::NOT_FOUND),
            (
                LedgerError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::InvalidState("cancelled".into()),
                StatusCode::CONFLICT,
            ),
            (
                LedgerError::InsufficientStock {
                    part_id: PartId::new(),
                    requested: 5,
                    available: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                LedgerError::Storage(StoreError::Timeout("lock".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LedgerError::Storage(StoreError::Corrupt("row".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ledger_error_to_response(err).status(), status);
        }
    }
}

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::InvalidAction(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_action", err.to_string())
        }
        LedgerError::InvalidQuantity(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_quantity", msg)
        }
        LedgerError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LedgerError::InsufficientStock {
            current_stock,
            requested_quantity,
        } => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": "Insufficient stock",
                "currentStock": current_stock,
                "requestedQuantity": requested_quantity,
            })),
        )
            .into_response(),
        LedgerError::ProductNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "Product not found")
        }
        LedgerError::DuplicateProduct(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        LedgerError::StorageUnavailable(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "storage_unavailable",
            "storage is temporarily unavailable",
        ),
        LedgerError::TransactionTimeout(_) => {
            json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string())
        }
    }
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
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
    use stockledger_core::ProductId;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::InvalidAction("Steal".into()), StatusCode::BAD_REQUEST),
            (LedgerError::InvalidQuantity("bad".into()), StatusCode::BAD_REQUEST),
            (
                LedgerError::InsufficientStock {
                    current_stock: 1,
                    requested_quantity: 2,
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::ProductNotFound(ProductId::new()), StatusCode::NOT_FOUND),
            (LedgerError::DuplicateProduct("sku 'A'".into()), StatusCode::CONFLICT),
            (
                LedgerError::StorageUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (LedgerError::TransactionTimeout(5000), StatusCode::GATEWAY_TIMEOUT),
        ];

        for (err, status) in cases {
            assert_eq!(ledger_error_to_response(err).status(), status);
        }
    }
}

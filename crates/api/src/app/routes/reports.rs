use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockledger_auth::Permission;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/movements", get(movements))
        .route("/value", get(value))
        .route("/low-stock", get(low_stock))
        .route("/expiry", get(expiry))
}

pub async fn movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    query: Result<Query<dto::ReportQuery>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::REPORTS_READ) {
        return resp;
    }

    let (start, end) = match query.map_err(errors::query_rejection).and_then(|Query(q)| q.window()) {
        Ok(w) => w,
        Err(resp) => return resp,
    };

    match services.stock_movement_report(start, end).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn value(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::REPORTS_READ) {
        return resp;
    }

    match services.inventory_value_report().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::REPORTS_READ) {
        return resp;
    }

    match services.low_stock_report().await {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn expiry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::REPORTS_READ) {
        return resp;
    }

    match services.expiry_report(chrono::Utc::now()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

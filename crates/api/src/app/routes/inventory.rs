use std::sync::Arc;

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_auth::Permission;
use stockledger_core::ProductId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/update", post(update_stock))
        .route("/logs", get(list_logs))
        .route("/low-stock", get(low_stock))
        .route("/stats", get(stats))
        .route("/audit/:id", get(audit_product))
}

pub async fn update_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::UpdateStockRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::STOCK_UPDATE) {
        return resp;
    }

    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let request = match body.into_movement() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.apply_movement(request, &actor.actor_ref()).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    query: Result<Query<dto::LogsQuery>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let page = services.pagination(query.page, query.limit);

    match services.list_movements(&filter, page).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    match services.list_low_stock().await {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    match services.compute_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Replay one product's ledger against its stored stock.
pub async fn audit_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::REPORTS_READ) {
        return resp;
    }

    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };

    match services.audit_product(id).await {
        Ok(audit) => Json(audit).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

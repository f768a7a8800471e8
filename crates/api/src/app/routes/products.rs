use std::sync::Arc;

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockledger_auth::Permission;
use stockledger_core::ProductId;
use stockledger_inventory::{NewProduct, ProductPatch};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/categories", get(categories))
        .route(
            "/:id",
            get(get_product).patch(update_product).delete(delete_product),
        )
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    query: Result<Query<dto::ProductsQuery>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    let filter = match query.map_err(errors::query_rejection).and_then(|Query(q)| q.to_filter()) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.list_products(&filter).await {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::PRODUCTS_MANAGE) {
        return resp;
    }

    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.create_product(input, &actor.actor_ref()).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    match services.categories().await {
        Ok(categories) => Json(categories).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::INVENTORY_READ) {
        return resp;
    }

    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };

    match services.get_product(id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::PRODUCTS_MANAGE) {
        return resp;
    }

    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };
    let Json(patch) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.update_product(id, patch).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&actor, &Permission::PRODUCTS_MANAGE) {
        return resp;
    }

    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };

    match services.delete_product(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

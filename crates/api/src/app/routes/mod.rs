use axum::{routing::get, Router};

pub mod inventory;
pub mod products;
pub mod reports;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/inventory", inventory::router())
        .nest("/products", products::router())
        .nest("/reports", reports::router())
}

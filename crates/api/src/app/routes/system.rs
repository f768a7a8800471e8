use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use stockledger_auth::authorize::role_permissions;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::ActorContext;

/// Liveness plus a storage round-trip.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "backend": services.backend_name(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            errors::json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                "storage is unreachable",
            )
        }
    }
}

pub async fn whoami(Extension(actor): Extension<ActorContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": actor.user_id().to_string(),
        "username": actor.username(),
        "role": actor.role().as_str(),
        "permissions": role_permissions(actor.role())
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
    }))
}

//! API-side authorization guard.
//!
//! Enforced at the route boundary (before the ledger is called), keeping the engine
//! auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use stockledger_auth::{authorize, Permission};

use crate::app::errors;
use crate::context::ActorContext;

/// Check that the request's actor holds `required`, or build the 403 response.
pub fn require(actor: &ActorContext, required: &Permission) -> Result<(), Response> {
    authorize(actor.role(), required).map_err(|e| {
        tracing::warn!(
            user_id = %actor.user_id(),
            permission = %required,
            "permission denied"
        );
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}

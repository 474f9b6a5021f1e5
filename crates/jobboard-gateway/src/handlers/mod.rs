//! HTTP handlers.

pub mod admin;
pub mod auth;

use axum::{Json, extract::rejection::JsonRejection};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::auth::{AuthError, PublicIdentity};

/// Response carrying a single identity.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    /// The identity, without its secret hash.
    pub user: PublicIdentity,
}

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always true.
    pub ok: bool,
}

pub(crate) const fn ok() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// Unwrap a JSON body, turning axum's rejection into a validation error.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AuthError::Validation(e.body_text()))
}

pub(crate) async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

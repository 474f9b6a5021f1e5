//! Authentication endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use jobboard_core::validation::{
    limits::{MAX_SECRET_LENGTH, MIN_SECRET_LENGTH},
    sanitize_display_name, validate_input,
};
use jobboard_core::{IdentityId, Role, normalize_email};
use serde::Deserialize;
use validator::Validate;

use super::{IdentityResponse, json_body, ok};
use crate::auth::{
    AuthError, CookieTransport, CurrentIdentity, Identity, NewIdentity, UnauthorizedReason,
};
use crate::server::GatewayState;

/// Registration request body.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address.
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Local secret.
    #[validate(length(
        min = MIN_SECRET_LENGTH,
        max = MAX_SECRET_LENGTH,
        message = "Password must be between 6 and 100 characters"
    ))]
    pub password: String,
    /// Display name.
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    /// Requested role, `seeker` or `employer`.
    #[serde(default)]
    pub role: Option<String>,
}

/// Login request body.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address.
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Local secret.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Query parameters Google sends to the callback.
#[derive(Debug, Deserialize)]
pub struct GoogleCallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn self_assigned_role(requested: Option<&str>) -> Result<Role, AuthError> {
    let role = match requested {
        None => Role::default(),
        Some(name) => name.parse::<Role>()?,
    };

    if role.is_self_assignable() {
        Ok(role)
    } else {
        Err(AuthError::Validation(
            "Role must be seeker or employer".to_string(),
        ))
    }
}

/// Start a session: record the login and set both cookies.
///
/// Tokens carry the role of the record as it stands after the login was
/// recorded, and an identity disabled in the meantime gets no session.
async fn sign_in(
    state: &GatewayState,
    jar: CookieJar,
    id: &IdentityId,
) -> Result<(CookieJar, Identity), AuthError> {
    let identity = state.store.record_login(id).await?;
    let pair = state.codec.issue_pair(&identity.id, identity.role)?;
    Ok((state.cookies.set_session(jar, &pair), identity))
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let body = json_body(payload)?;
    validate_input(&body)?;

    let email = normalize_email(&body.email)?;
    let name = sanitize_display_name(&body.name)?;
    let role = self_assigned_role(body.role.as_deref())?;

    if let Some(existing) = state.store.find_by_email(&email).await? {
        return Err(if existing.has_local_secret() {
            AuthError::EmailTaken
        } else {
            AuthError::FederatedAccountConflict
        });
    }

    let hash = state.verifier.hash_blocking(body.password).await?;
    let identity = state
        .store
        .create(NewIdentity::local(email, name, hash, role))
        .await?;

    let (jar, identity) = sign_in(&state, jar, &identity.id).await?;
    tracing::info!(identity = %identity.id, role = %identity.role, "Identity registered");

    Ok((
        StatusCode::CREATED,
        jar,
        Json(IdentityResponse {
            user: identity.to_public(),
        }),
    )
        .into_response())
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let body = json_body(payload)?;
    validate_input(&body)?;

    let email = normalize_email(&body.email).map_err(|_| AuthError::InvalidCredentials)?;

    let Some(identity) = state.store.find_by_email(&email).await? else {
        tracing::info!("Login for unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !identity.has_local_secret() {
        return Err(AuthError::FederatedAccountConflict);
    }

    if !state
        .verifier
        .verify_blocking(body.password, identity.secret_hash.clone())
        .await
    {
        tracing::info!(identity = %identity.id, "Login with wrong secret");
        return Err(AuthError::InvalidCredentials);
    }

    if !identity.active {
        tracing::warn!(identity = %identity.id, "Login to inactive identity");
        return Err(AuthError::AccountDisabled);
    }

    let (jar, identity) = sign_in(&state, jar, &identity.id).await.inspect_err(|e| {
        if matches!(e, AuthError::AccountDisabled) {
            tracing::warn!(identity = %identity.id, "Identity disabled during login");
        }
    })?;
    tracing::info!(identity = %identity.id, role = %identity.role, "Login");

    Ok((
        jar,
        Json(IdentityResponse {
            user: identity.to_public(),
        }),
    )
        .into_response())
}

/// `POST /api/auth/refresh`
pub async fn refresh(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    let Some(token) = CookieTransport::read(&jar).refresh else {
        return AuthError::Unauthorized(UnauthorizedReason::MissingCredentials).into_response();
    };

    match state.guard.rotate(&token).await {
        Ok((identity, pair)) => {
            tracing::debug!(identity = %identity.id, "Explicit refresh");
            (state.cookies.set_session(jar, &pair), ok()).into_response()
        }
        Err(AuthError::Unauthorized(reason)) if reason.clears_cookies() => (
            state.cookies.clear_session(jar),
            AuthError::Unauthorized(reason),
        )
            .into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    (state.cookies.clear_session(jar), ok()).into_response()
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<Arc<GatewayState>>,
    CurrentIdentity(current): CurrentIdentity,
) -> Result<Json<IdentityResponse>, AuthError> {
    let identity = state
        .store
        .find_by_id(&current.id)
        .await?
        .ok_or_else(|| AuthError::NotFound("user".to_string()))?;

    Ok(Json(IdentityResponse {
        user: identity.to_public(),
    }))
}

/// `GET /api/auth/google`
pub async fn google_start(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let client = state
        .google
        .as_ref()
        .ok_or_else(|| AuthError::NotFound("Google sign-in".to_string()))?;

    let (url, oauth_state) = client.authorization_url();
    let jar = client.store_state(jar, &oauth_state)?;
    Ok((jar, Redirect::to(&url)))
}

fn failure(state: &GatewayState, jar: CookieJar, code: &str) -> (CookieJar, Redirect) {
    (jar, Redirect::to(&state.bridge.failure_redirect(code)))
}

/// `GET /api/auth/google/callback`
pub async fn google_callback(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    Query(params): Query<GoogleCallbackParams>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let client = state
        .google
        .as_ref()
        .ok_or_else(|| AuthError::NotFound("Google sign-in".to_string()))?;

    let (jar, stored) = client.take_state(jar);

    if let Some(error) = params.error {
        tracing::info!(error = %error, "Google sign-in cancelled or refused");
        return Ok(failure(&state, jar, "auth_failed"));
    }

    let (Some(code), Some(returned_state), Some(stored)) = (params.code, params.state, stored)
    else {
        tracing::warn!("Google callback without code or state");
        return Ok(failure(&state, jar, "auth_failed"));
    };

    if returned_state != stored.csrf_token {
        tracing::warn!("Google callback state mismatch");
        return Ok(failure(&state, jar, "auth_failed"));
    }

    let assertion = match client.exchange_code(&code, &stored).await {
        Ok(assertion) => assertion,
        Err(e) => {
            tracing::error!("Google code exchange failed: {}", e);
            return Ok(failure(&state, jar, "server_error"));
        }
    };

    match state.bridge.complete(assertion).await {
        Ok(login) => Ok(state.bridge.respond(jar, &login)),
        Err(e) if e.is_internal() => {
            tracing::error!("Federated sign-in failed: {}", e);
            Ok(failure(&state, jar, "server_error"))
        }
        Err(e) => {
            tracing::info!("Federated sign-in refused: {}", e);
            Ok(failure(&state, jar, "auth_failed"))
        }
    }
}

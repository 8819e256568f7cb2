use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ClientIp, AUTH_COOKIE};
use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::setting_keys;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub need_setup: bool,
}

#[derive(Debug, Serialize)]
pub struct PasswordStatusResponse {
    pub password_set: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub need_setup: bool,
}

/// The session token is the password digest; changing the password
/// invalidates every session.
pub fn hash_password(password: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, password.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_ref())
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(cookie::time::Duration::days(7))
        .build()
}

fn stored_hash(state: &AppState) -> Result<Option<String>, ApiError> {
    Ok(state
        .db
        .get_setting(setting_keys::PASSWORD_HASH)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .filter(|hash| !hash.is_empty()))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    jar: CookieJar,
    AppJson(req): AppJson<PasswordRequest>,
) -> Result<(CookieJar, Json<JSend<SessionResponse>>), ApiError> {
    let stored = stored_hash(&state)?
        .ok_or_else(|| ApiError::conflict("Password has not been set"))?;

    let token = hash_password(&req.password);
    if token != stored {
        // the failure counter is only reset when a lockout lapses
        state.guard.record_failure(&ip)?;
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    tracing::info!(ip = %ip, "Login succeeded");
    let need_setup = !state.storage.is_configured().await;

    Ok((
        jar.add(session_cookie(token.clone())),
        JSend::success(SessionResponse { token, need_setup }),
    ))
}

/// First-run password. Refused once a password exists.
pub async fn setup_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<PasswordRequest>,
) -> Result<(CookieJar, Json<JSend<SessionResponse>>), ApiError> {
    if stored_hash(&state)?.is_some() {
        return Err(ApiError::conflict("Password is already set"));
    }
    if req.password.is_empty() {
        return Err(ApiError::bad_request("password must not be empty"));
    }

    let token = hash_password(&req.password);
    state
        .db
        .set_setting(setting_keys::PASSWORD_HASH, &token)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::info!("Password configured");
    let need_setup = !state.storage.is_configured().await;

    Ok((
        jar.add(session_cookie(token.clone())),
        JSend::success(SessionResponse { token, need_setup }),
    ))
}

pub async fn password_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PasswordStatusResponse>>, ApiError> {
    Ok(JSend::success(PasswordStatusResponse {
        password_set: stored_hash(&state)?.is_some(),
    }))
}

/// Only reachable with a valid token.
pub async fn auth_status(State(state): State<Arc<AppState>>) -> Json<JSend<AuthStatusResponse>> {
    JSend::success(AuthStatusResponse {
        authenticated: true,
        need_setup: !state.storage.is_configured().await,
    })
}

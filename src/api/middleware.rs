use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;

use crate::api::response::ApiError;
use crate::guard::client_ip;
use crate::storage::setting_keys;
use crate::AppState;

/// Address the guard attributed a request to. Inserted by [`rate_limit`].
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

pub const AUTH_COOKIE: &str = "auth_token";

/// Admission check run before every route.
pub async fn rate_limit(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);

    if let Err(e) = state.guard.check(&ip) {
        tracing::warn!(ip = %ip, error = %e, "Request rejected by guard");
        return ApiError::from(e).into_response();
    }

    req.extensions_mut().insert(ClientIp(ip));
    next.run(req).await
}

/// Bearer token from the Authorization header, or the auth cookie.
fn request_token(req: &Request) -> Option<String> {
    let headers = req.headers();

    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return value.strip_prefix("Bearer ").map(|t| t.trim().to_string());
    }

    CookieJar::from_headers(headers)
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Reject requests that do not carry the current session token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let stored = state
        .db
        .get_setting(setting_keys::PASSWORD_HASH)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Password has not been set"))?;

    match request_token(&req) {
        Some(token) if token == stored => Ok(next.run(req).await),
        Some(_) => Err(ApiError::unauthorized("Invalid token")),
        None => Err(ApiError::unauthorized("Missing bearer token")),
    }
}

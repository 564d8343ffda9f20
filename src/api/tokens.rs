//! Session token endpoints.
//!
//! - POST `/renew-access-token` - Exchange the refresh token for a new pair
//! - POST `/logout` - Revoke the refresh token and clear cookies

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::post,
};
use serde::Deserialize;

use super::error::ApiError;
use super::{ApiState, session_response};
use crate::auth::{ACCESS_COOKIE_NAME, Auth, REFRESH_COOKIE_NAME, clear_cookie, get_cookie};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/renew-access-token", post(renew_access_token))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct RenewRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Rotate the session. The refresh token is read from the cookie, or from
/// a JSON body `{"refresh_token": "..."}` when no cookie is present.
async fn renew_access_token(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = serde_json::from_slice::<RenewRequest>(&body)
        .ok()
        .and_then(|req| req.refresh_token);

    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .or(from_body.as_deref());

    let session = state.sessions.renew(token).await?;
    Ok(session_response(session, state.secure_cookies))
}

/// Revoke the caller's refresh token and clear both cookies.
async fn logout(
    State(state): State<ApiState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(auth.user_id).await?;

    let clear_access = clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies);
    let clear_refresh = clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({ "success": true })),
    ))
}

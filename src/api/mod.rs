mod error;
mod tokens;
mod users;

use axum::{
    Router,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{ACCESS_COOKIE_NAME, HasAuthBackend, REFRESH_COOKIE_NAME, session_cookie};
use crate::db::{Database, PublicUser};
use crate::jwt::JwtConfig;
use crate::session::{Session, SessionManager};

pub use error::ApiError;

/// State shared by every user endpoint.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionManager>,
    pub secure_cookies: bool,
}

impl HasAuthBackend for ApiState {
    fn jwt(&self) -> &JwtConfig {
        self.sessions.jwt()
    }

    fn db(&self) -> &Database {
        self.sessions.db()
    }

    fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

/// Create the API router.
pub fn create_api_router(sessions: Arc<SessionManager>, secure_cookies: bool) -> Router {
    let state = ApiState {
        sessions,
        secure_cookies,
    };

    Router::new().nest(
        "/users",
        users::router(state.clone()).merge(tokens::router(state)),
    )
}

#[derive(Serialize)]
struct SessionResponse {
    user: PublicUser,
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

/// Body plus both auth cookies for a freshly issued session.
fn session_response(session: Session, secure_cookies: bool) -> impl IntoResponse {
    let access_cookie = session_cookie(
        ACCESS_COOKIE_NAME,
        &session.access_token,
        session.access_expires_in,
        secure_cookies,
    );
    let refresh_cookie = session_cookie(
        REFRESH_COOKIE_NAME,
        &session.refresh_token,
        session.refresh_expires_in,
        secure_cookies,
    );

    (
        AppendHeaders([
            (SET_COOKIE, access_cookie),
            (SET_COOKIE, refresh_cookie),
        ]),
        Json(SessionResponse {
            user: session.user,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_in: session.access_expires_in,
        }),
    )
}

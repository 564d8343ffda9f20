//! User account endpoints.
//!
//! - POST `/register` - Create an account (multipart, avatar required)
//! - POST `/login` - Start a session
//! - GET `/me` - Current user
//! - POST `/change-password` - Replace the password

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{ApiState, session_response};
use crate::auth::Auth;
use crate::blob::BlobUpload;
use crate::session::{LoginInput, RegisterInput};

/// Avatar + cover image + form fields.
const REGISTER_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(REGISTER_BODY_LIMIT)),
        )
        .route("/login", post(login))
        .route("/me", get(current_user))
        .route("/change-password", post(change_password))
        .with_state(state)
}

/// Register a user from multipart form data.
///
/// Expected fields:
/// - `username`, `email`, `full_name`, `password`: text
/// - `avatar`: image file (required)
/// - `cover_image`: image file (optional)
async fn register(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = RegisterInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Invalid multipart data"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "username" | "email" | "full_name" | "fullName" | "password" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request(format!("Failed to read {}", name)))?;
                match name.as_str() {
                    "username" => input.username = text,
                    "email" => input.email = text,
                    "password" => input.password = text,
                    _ => input.full_name = text,
                }
            }
            "avatar" | "cover_image" | "coverImage" => {
                let file_name = field.file_name().unwrap_or(name.as_str()).to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request(format!("Failed to read {}", name)))?;
                // An empty file part counts as no file
                let upload = (!bytes.is_empty()).then(|| BlobUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
                if name == "avatar" {
                    input.avatar = upload;
                } else {
                    input.cover_image = upload;
                }
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let user = state.sessions.register(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<ApiState>,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body?;
    let session = state.sessions.login(payload).await?;
    Ok(session_response(session, state.secure_cookies))
}

async fn current_user(
    State(state): State<ApiState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.sessions.current_user(auth.user_id).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn change_password(
    State(state): State<ApiState>,
    Auth(auth): Auth,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body?;
    state
        .sessions
        .change_password(auth.user_id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use super::cookie::{ACCESS_COOKIE_NAME, get_bearer_token, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::db::PublicUser;
use crate::jwt::TokenType;

/// Resolve the caller from the access token in the request headers.
///
/// The `access_token` cookie takes precedence over an
/// `Authorization: Bearer` header.
pub async fn authenticate_request<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = get_cookie(headers, ACCESS_COOKIE_NAME)
        .filter(|token| !token.is_empty())
        .or_else(|| get_bearer_token(headers))
        .ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state
        .jwt()
        .verify(token, TokenType::Access)
        .map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthErrorKind::InvalidToken
        })?;

    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get user");
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    Ok(AuthenticatedUser {
        user_id: user.id,
        user: PublicUser::from(&user),
        claims,
    })
}

/// Extractor for API endpoints that require authentication.
/// Rejects before the handler runs when no valid access token is present.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(&parts.headers, state)
            .await
            .map(Auth)
            .map_err(|kind| ApiAuthError {
                kind,
                secure_cookies: state.secure_cookies(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser};
    use crate::jwt::JwtConfig;
    use axum::http::{HeaderValue, header};

    struct TestState {
        db: Database,
        jwt: JwtConfig,
    }

    impl HasAuthBackend for TestState {
        fn jwt(&self) -> &JwtConfig {
            &self.jwt
        }
        fn db(&self) -> &Database {
            &self.db
        }
        fn secure_cookies(&self) -> bool {
            false
        }
    }

    async fn state_with_user() -> TestState {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(&NewUser {
                uuid: "uuid-alice",
                username: "alice",
                email: "a@x.com",
                full_name: "Alice A",
                avatar_url: "http://media.local/a.png",
                cover_image_url: "",
                password_hash: "$2b$04$hash",
            })
            .await
            .unwrap();
        let jwt = JwtConfig::new(b"access-secret-for-testing", b"refresh-secret-for-testing")
            .unwrap();
        TestState { db, jwt }
    }

    fn headers(cookie: Option<&str>, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = cookie {
            headers.insert(
                header::COOKIE,
                HeaderValue::from_str(&format!("access_token={}", token)).unwrap(),
            );
        }
        if let Some(token) = bearer {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        headers
    }

    #[tokio::test]
    async fn test_cookie_token_resolves_user() {
        let state = state_with_user().await;
        let token = state.jwt.issue("uuid-alice", TokenType::Access).unwrap().token;

        let auth = authenticate_request(&headers(Some(&token), None), &state)
            .await
            .unwrap();
        assert_eq!(auth.user.username, "alice");
        assert_eq!(auth.user.id, "uuid-alice");
    }

    #[tokio::test]
    async fn test_bearer_header_resolves_user() {
        let state = state_with_user().await;
        let token = state.jwt.issue("uuid-alice", TokenType::Access).unwrap().token;

        let auth = authenticate_request(&headers(None, Some(&token)), &state)
            .await
            .unwrap();
        assert_eq!(auth.claims.sub, "uuid-alice");
    }

    #[tokio::test]
    async fn test_cookie_takes_precedence_over_header() {
        let state = state_with_user().await;
        let token = state.jwt.issue("uuid-alice", TokenType::Access).unwrap().token;

        let result = authenticate_request(&headers(Some("garbage"), Some(&token)), &state).await;
        assert_eq!(result.unwrap_err(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let state = state_with_user().await;

        let result = authenticate_request(&HeaderMap::new(), &state).await;
        assert_eq!(result.unwrap_err(), AuthErrorKind::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let state = state_with_user().await;
        let token = state.jwt.issue("uuid-alice", TokenType::Refresh).unwrap().token;

        let result = authenticate_request(&headers(None, Some(&token)), &state).await;
        assert_eq!(result.unwrap_err(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let state = state_with_user().await;
        let token = state.jwt.issue("uuid-ghost", TokenType::Access).unwrap().token;

        let result = authenticate_request(&headers(Some(&token), None), &state).await;
        assert_eq!(result.unwrap_err(), AuthErrorKind::UserNotFound);
    }
}

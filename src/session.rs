//! Session lifecycle: registration, login, token renewal, logout and
//! password change.
//!
//! The only server-side session state is the digest of the user's current
//! refresh token. Overwriting it revokes every earlier refresh token, and
//! clearing it logs the user out everywhere.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::blob::{BlobStore, BlobUpload, StoredBlob, UploadError};
use crate::db::{Database, NewUser, PublicUser, User, is_unique_violation};
use crate::jwt::{JwtConfig, TokenPair, TokenType};
use crate::password::{MAX_PASSWORD_BYTES, PasswordHasher};

/// Default limit for a single blob upload.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_USERNAME_LEN: usize = 32;

/// Failure of a session operation, classified for the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    /// Any credential or token failure. The cause is never exposed.
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Upstream(String),
    #[error("Database error")]
    Store,
    #[error("Internal error")]
    Internal,
}

impl SessionError {
    fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn store(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Store
    }

    fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Internal
    }
}

trait StoreResultExt<T> {
    fn store_err(self, context: &str) -> Result<T, SessionError>;
}

impl<T> StoreResultExt<T> for Result<T, sqlx::Error> {
    fn store_err(self, context: &str) -> Result<T, SessionError> {
        self.map_err(|e| SessionError::store(context, e))
    }
}

/// Registration payload as received from the transport layer.
#[derive(Debug, Default)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: Option<BlobUpload>,
    pub cover_image: Option<BlobUpload>,
}

/// Login payload. Either identifier may be given; username wins.
#[derive(Debug, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A user together with a freshly issued token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: PublicUser,
    pub access_token: String,
    pub access_expires_in: u64,
    pub refresh_token: String,
    pub refresh_expires_in: u64,
}

impl Session {
    fn new(user: &User, pair: TokenPair) -> Self {
        Self {
            user: PublicUser::from(user),
            access_token: pair.access.token,
            access_expires_in: pair.access.expires_in,
            refresh_token: pair.refresh.token,
            refresh_expires_in: pair.refresh.expires_in,
        }
    }
}

/// Orchestrates the credential store, password hasher, token config and
/// blob store.
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: PasswordHasher,
    blobs: Arc<dyn BlobStore>,
    upload_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        db: Database,
        jwt: Arc<JwtConfig>,
        hasher: PasswordHasher,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            db,
            jwt,
            hasher,
            blobs,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Create a user. The avatar is mandatory, the cover image best effort.
    pub async fn register(&self, input: RegisterInput) -> Result<PublicUser, SessionError> {
        let username = required("username", &input.username)?.to_lowercase();
        let email = required("email", &input.email)?.to_lowercase();
        let full_name = required("full_name", &input.full_name)?;
        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&input.password)?;

        let users = self.db.users();

        // Pre-check only; the UNIQUE constraints below settle races.
        if users
            .find_by_username_or_email(&username, &email)
            .await
            .store_err("Failed to check existing user")?
            .is_some()
        {
            return Err(conflict());
        }

        let avatar = input
            .avatar
            .ok_or_else(|| SessionError::validation("Avatar file is required"))?;
        let avatar_url = self
            .upload(avatar)
            .await
            .map_err(|e| {
                error!(error = %e, "Avatar upload failed");
                SessionError::Upstream("Avatar upload failed".into())
            })?
            .url;

        let cover_image_url = match input.cover_image {
            Some(cover) => match self.upload(cover).await {
                Ok(stored) => stored.url,
                Err(e) => {
                    warn!(error = %e, "Cover image upload failed, continuing without it");
                    String::new()
                }
            },
            None => String::new(),
        };

        let password_hash = self
            .hasher
            .hash(&input.password)
            .await
            .map_err(|e| SessionError::internal("Failed to hash password", e))?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let id = match users
            .create(&NewUser {
                uuid: &uuid,
                username: &username,
                email: &email,
                full_name,
                avatar_url: &avatar_url,
                cover_image_url: &cover_image_url,
                password_hash: &password_hash,
            })
            .await
        {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => return Err(conflict()),
            Err(e) => return Err(SessionError::store("Failed to create user", e)),
        };

        let user = users
            .get_by_id(id)
            .await
            .store_err("Failed to load created user")?
            .ok_or_else(|| SessionError::store("Created user vanished", id))?;

        info!(user_id = %user.uuid, username = %user.username, "User registered");
        Ok(PublicUser::from(&user))
    }

    /// Check credentials and start a new session, revoking the previous one.
    pub async fn login(&self, input: LoginInput) -> Result<Session, SessionError> {
        let identifier = non_blank(input.username.as_deref())
            .or_else(|| non_blank(input.email.as_deref()))
            .ok_or_else(|| SessionError::validation("Username or email is required"))?;
        let password = input
            .password
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SessionError::validation("Password is required"))?;

        let users = self.db.users();
        let Some(user) = users
            .find_by_login(identifier)
            .await
            .store_err("Failed to look up user")?
        else {
            // Same bcrypt work as a real check, so timing does not reveal unknown identifiers
            if let Err(e) = self.hasher.hash(password).await {
                debug!(error = %e, "Timing hash failed");
            }
            debug!("Login rejected: unknown identifier");
            return Err(SessionError::Unauthorized);
        };

        if !self.hasher.verify(password, &user.password_hash).await {
            debug!(user_id = %user.uuid, "Login rejected: wrong password");
            return Err(SessionError::Unauthorized);
        }

        let pair = self.issue_pair(&user)?;
        users
            .set_refresh_token_hash(user.id, Some(&token_digest(&pair.refresh.token)))
            .await
            .store_err("Failed to store refresh token")?;

        info!(user_id = %user.uuid, "User logged in");
        Ok(Session::new(&user, pair))
    }

    /// Exchange the current refresh token for a new pair (rotation).
    pub async fn renew(&self, refresh_token: Option<&str>) -> Result<Session, SessionError> {
        let token = non_blank(refresh_token).ok_or(SessionError::Unauthorized)?;

        let claims = self
            .jwt
            .verify(token, TokenType::Refresh)
            .map_err(|e| {
                debug!(error = %e, "Refresh token rejected");
                SessionError::Unauthorized
            })?;

        let users = self.db.users();
        let user = users
            .get_by_uuid(&claims.sub)
            .await
            .store_err("Failed to look up user")?
            .ok_or(SessionError::Unauthorized)?;

        let presented = token_digest(token);
        if user.refresh_token_hash.as_deref() != Some(presented.as_str()) {
            debug!(user_id = %user.uuid, "Refresh token superseded or logged out");
            return Err(SessionError::Unauthorized);
        }

        let pair = self.issue_pair(&user)?;
        let rotated = users
            .rotate_refresh_token_hash(user.id, &presented, &token_digest(&pair.refresh.token))
            .await
            .store_err("Failed to rotate refresh token")?;
        if !rotated {
            debug!(user_id = %user.uuid, "Refresh token rotated concurrently");
            return Err(SessionError::Unauthorized);
        }

        info!(user_id = %user.uuid, "Session renewed");
        Ok(Session::new(&user, pair))
    }

    /// Clear the stored refresh token. Calling it twice is fine.
    pub async fn logout(&self, user_id: i64) -> Result<(), SessionError> {
        self.db
            .users()
            .set_refresh_token_hash(user_id, None)
            .await
            .store_err("Failed to clear refresh token")?;
        info!(user_id, "User logged out");
        Ok(())
    }

    /// Replace the password after checking the old one.
    /// The current refresh token stays valid.
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        if old_password.is_empty() || new_password.trim().is_empty() {
            return Err(SessionError::validation(
                "Old and new password are required",
            ));
        }
        validate_password(new_password)?;

        let users = self.db.users();
        let user = users
            .get_by_id(user_id)
            .await
            .store_err("Failed to look up user")?
            .ok_or(SessionError::Unauthorized)?;

        if !self.hasher.verify(old_password, &user.password_hash).await {
            debug!(user_id = %user.uuid, "Password change rejected: wrong old password");
            return Err(SessionError::Unauthorized);
        }

        let hash = self
            .hasher
            .hash(new_password)
            .await
            .map_err(|e| SessionError::internal("Failed to hash password", e))?;
        users
            .set_password_hash(user.id, &hash)
            .await
            .store_err("Failed to update password")?;

        info!(user_id = %user.uuid, "Password changed");
        Ok(())
    }

    /// Public view of the given user.
    pub async fn current_user(&self, user_id: i64) -> Result<PublicUser, SessionError> {
        self.db
            .users()
            .get_by_id(user_id)
            .await
            .store_err("Failed to look up user")?
            .map(|user| PublicUser::from(&user))
            .ok_or(SessionError::Unauthorized)
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, SessionError> {
        self.jwt
            .issue_pair(&user.uuid)
            .map_err(|e| SessionError::internal("Failed to issue tokens", e))
    }

    async fn upload(&self, file: BlobUpload) -> Result<StoredBlob, UploadError> {
        tokio::time::timeout(self.upload_timeout, self.blobs.upload(file))
            .await
            .unwrap_or(Err(UploadError::Timeout))
    }
}

fn conflict() -> SessionError {
    SessionError::Conflict("User with this username or email already exists".into())
}

/// SHA-256 of a refresh token, the form kept in the store.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, SessionError> {
    non_blank(Some(value)).ok_or_else(|| SessionError::validation(format!("{} is required", field)))
}

fn validate_username(username: &str) -> Result<(), SessionError> {
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(SessionError::validation(format!(
            "Username cannot be longer than {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(SessionError::validation(
            "Username can only contain letters, numbers, '_', '.' and '-'",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), SessionError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SessionError::validation("Email address is invalid"))
    }
}

fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.trim().is_empty() {
        return Err(SessionError::validation("password is required"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(SessionError::validation(format!(
            "Password cannot be longer than {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_digest_is_stable_hex() {
        let digest = token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("abc"));
        assert_ne!(digest, token_digest("abd"));
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required("username", "  alice ").unwrap(), "alice");
        assert!(matches!(
            required("username", "   "),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice_01.b-c").is_ok());
        assert!(validate_username("alice@bob").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("ax.com").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a@b@c").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Secr3t!").is_ok());
        assert!(validate_password("  ").is_err());
        assert!(validate_password(&"p".repeat(73)).is_err());
    }
}

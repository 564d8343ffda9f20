//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets and carry a
//! `typ` claim, so one class can never stand in for the other.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, never persisted
    Access,
    /// Long-lived refresh token, one current value per user
    Refresh,
}

/// JWT claims shared by both token classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// JWT ID, makes every issued token distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token duration: 15 minutes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Default refresh token duration: 10 days
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 10 * 24 * 60 * 60;

/// Longest accepted lifetime for either token class: 365 days
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Signing material and lifetime for one token class.
#[derive(Clone)]
struct KeyPair {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: u64,
}

impl KeyPair {
    fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access: KeyPair,
    refresh: KeyPair,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Token duration in seconds
    pub expires_in: u64,
}

/// Access and refresh tokens issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

impl JwtConfig {
    /// Create a configuration with the default token lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, JwtError> {
        Self::with_ttls(
            access_secret,
            refresh_secret,
            DEFAULT_ACCESS_TOKEN_TTL_SECS,
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        )
    }

    /// Create a configuration with explicit lifetimes (in seconds).
    ///
    /// Rejects identical secrets and an access lifetime that is not shorter
    /// than the refresh lifetime.
    pub fn with_ttls(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_secs: u64,
        refresh_ttl_secs: u64,
    ) -> Result<Self, JwtError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(JwtError::InvalidConfig("token secrets must not be empty"));
        }
        if access_secret == refresh_secret {
            return Err(JwtError::InvalidConfig(
                "access and refresh secrets must differ",
            ));
        }
        if refresh_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(JwtError::InvalidConfig(
                "refresh token lifetime must not exceed 365 days",
            ));
        }
        if access_ttl_secs == 0 || access_ttl_secs >= refresh_ttl_secs {
            return Err(JwtError::InvalidConfig(
                "access token lifetime must be positive and shorter than the refresh lifetime",
            ));
        }

        Ok(Self {
            access: KeyPair::new(access_secret, access_ttl_secs),
            refresh: KeyPair::new(refresh_secret, refresh_ttl_secs),
        })
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    /// Sign a token of the given class for a user.
    pub fn issue(&self, user_uuid: &str, token_type: TokenType) -> Result<IssuedToken, JwtError> {
        let keys = self.keys(token_type);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let exp = now.checked_add(keys.ttl_secs).ok_or(JwtError::TimeError)?;

        let jti = uuid::Uuid::new_v4().to_string();
        let claims = Claims {
            sub: user_uuid.to_string(),
            token_type,
            jti: jti.clone(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            jti,
            expires_in: keys.ttl_secs,
        })
    }

    /// Sign a fresh access/refresh pair for a user.
    pub fn issue_pair(&self, user_uuid: &str) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.issue(user_uuid, TokenType::Access)?,
            refresh: self.issue(user_uuid, TokenType::Refresh)?,
        })
    }

    /// Validate a token against the secret of the expected class.
    pub fn verify(&self, token: &str, token_type: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<Claims>(token, &self.keys(token_type).decoding_key, &validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::Expired,
                    ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                    _ => JwtError::Malformed,
                })?;

        if token_data.claims.token_type != token_type {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Token is past its expiry
    Expired,
    /// Signature does not match the class secret
    InvalidSignature,
    /// Token or claims could not be parsed
    Malformed,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
    /// System time error
    TimeError,
    /// Rejected key or lifetime configuration
    InvalidConfig(&'static str),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::InvalidSignature => write!(f, "Invalid token signature"),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::InvalidConfig(msg) => write!(f, "Invalid token configuration: {}", msg),
        }
    }
}

impl std::error::Error for JwtError {}

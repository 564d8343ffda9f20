pub mod api;
pub mod auth;
pub mod blob;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod session;

use api::create_api_router;
use axum::Router;
use blob::BlobStore;
use db::Database;
use jwt::{JwtConfig, JwtError};
use password::PasswordHasher;
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Path prefix of the versioned API.
pub const API_PREFIX: &str = "/api/v1";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, must differ from the access secret
    pub refresh_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl: u64,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Where avatar and cover images go
    pub blob_store: Arc<dyn BlobStore>,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Limit for a single blob upload
    pub upload_timeout: Duration,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, JwtError> {
    let jwt = Arc::new(JwtConfig::with_ttls(
        &config.access_secret,
        &config.refresh_secret,
        config.access_ttl,
        config.refresh_ttl,
    )?);

    let sessions = SessionManager::new(
        config.db.clone(),
        jwt,
        PasswordHasher::new(config.bcrypt_cost),
        config.blob_store.clone(),
    )
    .with_upload_timeout(config.upload_timeout);

    let api_router = create_api_router(Arc::new(sessions), config.secure_cookies);

    Ok(Router::new().nest(API_PREFIX, api_router))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(app: Router, listener: TcpListener) -> Result<(), std::io::Error> {
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

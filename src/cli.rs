//! CLI argument parsing, validation, and startup helpers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use url::Url;

use crate::ServerConfig;
use crate::blob::{BlobStore, DirectoryBlobStore, HttpBlobStore};
use crate::db::Database;
use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS};

const MIN_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tubekeep",
    about = "User accounts and session tokens for a video platform"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "tubekeep.db")]
    pub database: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    pub refresh_token_ttl: u64,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// URL of the media service that accepts multipart uploads
    #[arg(long, env = "BLOB_ENDPOINT", conflicts_with = "blob_dir")]
    pub blob_endpoint: Option<String>,

    /// Store uploads in this directory instead of a media service
    #[arg(long, env = "BLOB_DIR", requires = "blob_public_url")]
    pub blob_dir: Option<PathBuf>,

    /// Public base URL under which --blob-dir is served
    #[arg(long, env = "BLOB_PUBLIC_URL")]
    pub blob_public_url: Option<String>,

    /// Upload timeout in seconds
    #[arg(long, env = "UPLOAD_TIMEOUT", default_value = "30")]
    pub upload_timeout: u64,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST,
        value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Drop the Secure flag from auth cookies. Only for local development over plain HTTP
    #[arg(long, env = "INSECURE_COOKIES")]
    pub insecure_cookies: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    /// Auth cookies carry the Secure flag unless explicitly opted out.
    pub fn secure_cookies(&self) -> bool {
        !self.insecure_cookies
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env = %env_var,
            "Token secret is required. Set the environment variable (recommended) or use the secret file option"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            env = %env_var,
            "Secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Pick the blob store from the arguments.
/// Returns None and logs an error if neither store is configured or the URL is invalid.
pub fn build_blob_store(args: &Args) -> Option<Arc<dyn BlobStore>> {
    if let Some(endpoint) = args.blob_endpoint.as_deref() {
        return match Url::parse(endpoint) {
            Ok(url) => {
                info!(endpoint = %url, "Uploading blobs to media service");
                let store: Arc<dyn BlobStore> = Arc::new(HttpBlobStore::new(url));
                Some(store)
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Invalid blob endpoint URL");
                None
            }
        };
    }

    match (&args.blob_dir, args.blob_public_url.as_deref()) {
        (Some(dir), Some(public_url)) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!(path = %dir.display(), error = %e, "Failed to create blob directory");
                return None;
            }
            info!(path = %dir.display(), "Storing blobs in directory");
            let store: Arc<dyn BlobStore> =
                Arc::new(DirectoryBlobStore::new(dir.clone(), public_url));
            Some(store)
        }
        _ => {
            error!("A blob store is required. Use --blob-endpoint or --blob-dir with --blob-public-url");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
    blob_store: Arc<dyn BlobStore>,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        access_ttl: args.access_token_ttl,
        refresh_ttl: args.refresh_token_ttl,
        secure_cookies: args.secure_cookies(),
        blob_store,
        bcrypt_cost: args.bcrypt_cost,
        upload_timeout: Duration::from_secs(args.upload_timeout),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

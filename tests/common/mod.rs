#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use tubekeep::{
    ServerConfig,
    blob::{BlobStore, BlobUpload, StoredBlob, UploadError},
    create_app,
    db::Database,
    jwt::JwtConfig,
    password::PasswordHasher,
    session::{RegisterInput, SessionManager},
};

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

/// Lowest cost bcrypt accepts; keeps the tests fast.
pub const TEST_BCRYPT_COST: u32 = 4;

/// How the in-memory blob store answers uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobBehavior {
    Succeed,
    Fail,
    /// Never completes, so the caller's timeout fires.
    Hang,
}

/// In-memory blob store that records every upload it receives.
pub struct RecordingBlobStore {
    behavior: BlobBehavior,
    /// File names that fail even when the store otherwise succeeds.
    failing_names: Vec<String>,
    uploads: Mutex<Vec<BlobUpload>>,
}

impl RecordingBlobStore {
    pub fn new(behavior: BlobBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            failing_names: Vec::new(),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_for(name: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: BlobBehavior::Succeed,
            failing_names: vec![name.to_string()],
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.file_name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(&self, file: BlobUpload) -> Result<StoredBlob, UploadError> {
        match self.behavior {
            BlobBehavior::Fail => return Err(UploadError::MissingUrl),
            BlobBehavior::Hang => std::future::pending::<()>().await,
            BlobBehavior::Succeed => {}
        }
        if self.failing_names.contains(&file.file_name) {
            return Err(UploadError::MissingUrl);
        }

        let url = format!("http://media.local/{}", file.file_name);
        self.uploads.lock().unwrap().push(file);
        Ok(StoredBlob { url })
    }
}

pub fn jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET).expect("valid test secrets")
}

/// Session manager over a fresh in-memory database.
pub async fn session_manager(blobs: Arc<dyn BlobStore>) -> SessionManager {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    SessionManager::new(
        db,
        Arc::new(jwt()),
        PasswordHasher::new(TEST_BCRYPT_COST),
        blobs,
    )
    .with_upload_timeout(Duration::from_millis(200))
}

/// Full application router plus its database.
pub async fn create_test_app(blobs: Arc<dyn BlobStore>) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: 900,
        refresh_ttl: 864000,
        secure_cookies: false,
        blob_store: blobs,
        bcrypt_cost: TEST_BCRYPT_COST,
        upload_timeout: Duration::from_millis(200),
    };
    (create_app(&config).expect("valid config"), db)
}

pub fn image(name: &str) -> BlobUpload {
    BlobUpload {
        file_name: name.to_string(),
        content_type: Some("image/png".to_string()),
        bytes: b"\x89PNG fake image".to_vec(),
    }
}

pub fn alice() -> RegisterInput {
    RegisterInput {
        username: "alice".to_string(),
        email: "a@x.com".to_string(),
        full_name: "Alice A".to_string(),
        password: "Secr3t!".to_string(),
        avatar: Some(image("a.png")),
        cover_image: None,
    }
}

/// Hand-rolled multipart/form-data body.
pub struct MultipartBuilder {
    boundary: &'static str,
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self {
            boundary: "tubekeep-test-boundary",
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                self.boundary, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// Registration form for alice with an avatar.
pub fn alice_form() -> MultipartBuilder {
    MultipartBuilder::new()
        .text("username", "alice")
        .text("email", "a@x.com")
        .text("full_name", "Alice A")
        .text("password", "Secr3t!")
        .file("avatar", "a.png", b"\x89PNG fake image")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the named cookie among `Set-Cookie` headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let first = c.split(';').next()?;
        let (key, value) = first.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

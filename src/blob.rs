//! Blob store collaborator for avatar and cover images.
//!
//! The store only has to hand back a retrievable URL. Uploads are held in
//! memory, so a failed upload leaves nothing behind on our side.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// A file received from the client, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("empty upload")]
    Empty,
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("blob store returned {0}")]
    Status(reqwest::StatusCode),
    #[error("blob store response has no usable url")]
    MissingUrl,
    #[error("failed to write blob: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload timed out")]
    Timeout,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file: BlobUpload) -> Result<StoredBlob, UploadError>;
}

/// Uploads to a remote media service with a multipart POST.
///
/// The service must answer with JSON carrying `url` or `secure_url`.
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: url::Url,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
    secure_url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, file: BlobUpload) -> Result<StoredBlob, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Status(response.status()));
        }

        let body: UploadResponse = response.json().await?;
        let url = body
            .secure_url
            .or(body.url)
            .filter(|url| !url.is_empty())
            .ok_or(UploadError::MissingUrl)?;

        info!(url = %url, "Blob uploaded");
        Ok(StoredBlob { url })
    }
}

/// Writes blobs into a local directory served under `public_base_url`.
pub struct DirectoryBlobStore {
    dir: PathBuf,
    public_base_url: String,
}

impl DirectoryBlobStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Keep only characters that are safe in a file name and a URL path.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl BlobStore for DirectoryBlobStore {
    async fn upload(&self, file: BlobUpload) -> Result<StoredBlob, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let name = format!(
            "{}-{}",
            uuid::Uuid::new_v4(),
            sanitize_file_name(&file.file_name)
        );
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&name), &file.bytes).await?;

        Ok(StoredBlob {
            url: format!("{}/{}", self.public_base_url, name),
        })
    }
}

//! HTTP progress server and blob store clients.
//!
//! Routes, relative to the configured base URL:
//!
//! | Method   | Path                        | Result                                   |
//! |----------|-----------------------------|------------------------------------------|
//! | `GET`    | `progress/{user}/{image}`   | `200` record, `404` none                 |
//! | `PUT`    | `progress/{user}/{image}`   | `200` stored record, `409` stored record |
//! | `DELETE` | `progress/{user}/{image}`   | `2xx` or `404`                           |
//! | `PUT`    | `blobs/{path}`              | `{ "url": ... }`                         |
//!
//! With a profile the progress path is `progress/{user}/{profile}/{image}`.

use std::time::Duration;

use async_trait::async_trait;
use crayon_core::{CanvasProgress, ProgressKey};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{BlobStore, ProgressRemote, ProgressUpload};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

fn build_client(timeout: Duration) -> RemoteResult<Client> {
    Client::builder()
        .user_agent(concat!("crayon-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(RemoteError::from)
}

fn parse_base(base_url: &str) -> RemoteResult<Url> {
    let url = Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(RemoteError::InvalidUrl(format!(
            "{base_url} cannot be used as a base URL"
        )));
    }
    Ok(url)
}

/// Append path segments to `base`, percent-encoding each one.
fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> RemoteResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RemoteError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-success response into an error.
async fn status_error(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    RemoteError::Status { status, message }
}

/// [`ProgressRemote`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpProgressRemote {
    http: Client,
    base: Url,
}

impl HttpProgressRemote {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] if the URL is malformed.
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] if the URL is malformed.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base: parse_base(base_url)?,
        })
    }

    fn progress_url(&self, key: &ProgressKey) -> RemoteResult<Url> {
        let segments = key.path_segments();
        // `Url` drops dot segments instead of encoding them
        if segments.iter().any(|s| matches!(*s, "." | "..")) {
            return Err(RemoteError::InvalidUrl(format!("{key} has a dot segment")));
        }
        join_segments(&self.base, std::iter::once("progress").chain(segments))
    }
}

#[async_trait]
impl ProgressRemote for HttpProgressRemote {
    async fn fetch(&self, key: &ProgressKey) -> RemoteResult<Option<CanvasProgress>> {
        let url = self.progress_url(key)?;
        tracing::debug!(%url, "Fetching progress");
        let response = self.http.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            _ => Err(status_error(response).await),
        }
    }

    async fn save(&self, key: &ProgressKey, upload: ProgressUpload) -> RemoteResult<CanvasProgress> {
        let url = self.progress_url(key)?;
        let base_version = upload.base_version;
        tracing::debug!(%url, base_version, actions = upload.actions.len(), "Saving progress");
        let response = self.http.put(url).json(&upload).send().await?;

        match response.status() {
            StatusCode::CONFLICT => {
                let stored: CanvasProgress = response.json().await?;
                Err(RemoteError::StaleVersion {
                    base_version,
                    stored: Box::new(stored),
                })
            }
            s if s.is_success() => Ok(response.json().await?),
            _ => Err(status_error(response).await),
        }
    }

    async fn delete(&self, key: &ProgressKey) -> RemoteResult<()> {
        let url = self.progress_url(key)?;
        tracing::debug!(%url, "Deleting progress");
        let response = self.http.delete(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            _ => Err(status_error(response).await),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobReceipt {
    url: String,
}

/// [`BlobStore`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    http: Client,
    base: Url,
}

impl HttpBlobStore {
    /// Create a client for the blob endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] if the URL is malformed.
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Ok(Self {
            http: build_client(DEFAULT_TIMEOUT)?,
            base: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<String> {
        let url = join_segments(
            &self.base,
            std::iter::once("blobs").chain(path.split('/').filter(|s| !s.is_empty())),
        )?;
        tracing::debug!(%url, bytes = bytes.len(), "Uploading blob");
        let response = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let receipt: BlobReceipt = response.json().await?;
        Ok(receipt.url)
    }
}

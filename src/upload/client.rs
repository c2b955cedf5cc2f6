//! UploadClient - sends captured images to the upload endpoint.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::camera::CapturedArtifact;

/// The environment variable overriding the configured upload endpoint.
pub const UPLOAD_URL_ENV: &str = "TETHERCAM_UPLOAD_URL";

/// Default upload endpoint.
pub const DEFAULT_UPLOAD_URL: &str = "http://localhost:3000/api/upload-raw";

/// Multipart field carrying the image.
pub const UPLOAD_FIELD_NAME: &str = "rawImage";

/// Default timeout for upload requests. Raw files are large.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a successful upload.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Body of a failed upload.
#[derive(Debug, Deserialize)]
struct UploadFailure {
    #[serde(default)]
    message: Option<String>,
}

/// Where an uploaded artifact ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub url: String,
}

/// Client for the artifact upload endpoint.
pub struct UploadClient {
    endpoint: String,
    http_client: reqwest::Client,
}

impl UploadClient {
    /// Create a client for an explicit endpoint.
    ///
    /// Useful for testing against a mock server.
    pub fn with_endpoint(endpoint: String) -> Result<Self, UploadError> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(UploadError::InvalidEndpoint(endpoint));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload one artifact as `multipart/form-data`.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::Rejected` when the endpoint answers with an
    /// error status (carrying its `message` when it sent one),
    /// `UploadError::MalformedResponse` when a success body has no `url`,
    /// or `UploadError::HttpError` if the request itself fails.
    pub async fn upload(&self, artifact: &CapturedArtifact) -> Result<UploadReceipt, UploadError> {
        let part = Part::bytes(artifact.data.clone())
            .file_name(artifact.name.clone())
            .mime_str(&artifact.mime_type)?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        log::info!(
            "Uploading {} ({:.2} MB) to {}",
            artifact.name,
            artifact.size_mb(),
            self.endpoint
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UploadFailure>(&body)
                .ok()
                .and_then(|failure| failure.message)
                .unwrap_or_else(|| format!("Upload failed with status: {}", status.as_u16()));
            log::error!("Upload error: {}", message);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response.json().await?;
        match body.url {
            Some(url) => {
                log::info!("Upload successful: {}", url);
                Ok(UploadReceipt { url })
            }
            None => Err(UploadError::MalformedResponse(
                "response has no 'url' field".to_string(),
            )),
        }
    }
}

/// Errors that can occur during uploads.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid upload endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Server-provided message, or a generic one
        message: String,
    },

    #[error("Unexpected upload response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_endpoint_creates_client() {
        let client = UploadClient::with_endpoint("https://example.com/upload".to_string()).unwrap();
        assert_eq!(client.endpoint(), "https://example.com/upload");
    }

    #[test]
    fn test_with_endpoint_rejects_non_http() {
        let result = UploadClient::with_endpoint("ftp://example.com".to_string());
        assert!(matches!(result, Err(UploadError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_rejected_display_is_server_message() {
        let err = UploadError::Rejected {
            status: 413,
            message: "File too large".to_string(),
        };
        assert_eq!(err.to_string(), "File too large");
    }
}

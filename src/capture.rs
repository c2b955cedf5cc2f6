//! Full-resolution capture.
//!
//! [`CaptureController`] takes one picture on demand and hands it back as a
//! [`CaptureLease`]: the artifact plus a transient handle. A lease goes to
//! exactly one consumer (saved to disk, uploaded, or taken as the raw
//! artifact), and the handle is released when it does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::camera::{CameraError, CameraSession, CapturedArtifact, Operation};
use crate::handles::{HandleRegistry, ObjectHandle};
use crate::upload::{UploadClient, UploadError, UploadReceipt};

/// Triggers captures on a session.
pub struct CaptureController {
    session: Arc<CameraSession>,
    registry: Arc<dyn HandleRegistry>,
}

impl CaptureController {
    pub fn new(session: Arc<CameraSession>, registry: Arc<dyn HandleRegistry>) -> Self {
        Self { session, registry }
    }

    /// Take one full-resolution picture.
    ///
    /// Session errors are returned as-is and never change connectivity.
    pub async fn capture_image(&self) -> Result<CaptureLease, CameraError> {
        let ops = self.session.get_supported_ops().await?;
        if !ops.capture_image {
            return Err(CameraError::OperationNotSupported(Operation::CaptureImage));
        }

        let artifact = self.session.capture_image_as_file().await.map_err(|e| {
            log::error!("Capture error: {}", e);
            e
        })?;
        let handle = ObjectHandle::new(Arc::clone(&self.registry), &artifact.mime_type, artifact.len());
        Ok(CaptureLease { artifact, handle })
    }
}

/// A captured artifact waiting for its one consumer.
#[derive(Debug)]
pub struct CaptureLease {
    artifact: CapturedArtifact,
    handle: ObjectHandle,
}

impl CaptureLease {
    pub fn artifact(&self) -> &CapturedArtifact {
        &self.artifact
    }

    pub fn file_name(&self) -> &str {
        &self.artifact.name
    }

    pub fn handle_id(&self) -> &str {
        self.handle.id()
    }

    /// Write the artifact into `dir` under its own file name.
    pub async fn save_to(self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.artifact.name);
        tokio::fs::write(&path, &self.artifact.data).await?;
        log::info!("Saved {} to {}", self.artifact.name, path.display());
        Ok(path)
    }

    /// Send the artifact to the upload endpoint.
    pub async fn upload(self, client: &UploadClient) -> Result<UploadReceipt, UploadError> {
        client.upload(&self.artifact).await
    }

    /// Release the handle and keep the raw artifact.
    pub fn into_artifact(self) -> CapturedArtifact {
        self.artifact
    }
}

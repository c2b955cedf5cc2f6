//! Camera controller: the state a front end renders and the intents it sends.
//!
//! Wraps a [`CameraSession`], its [`PreviewStream`] and a
//! [`CaptureController`], and keeps the connection status, the last loaded
//! settings and capabilities, and the last error message.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::{
    CameraError, CameraSession, CapabilityProvider, ConfigNode, ConfigValue, DeviceFilter,
    PreviewFrame, SupportedOps,
};
use crate::capture::{CaptureController, CaptureLease};
use crate::handles::HandleRegistry;
use crate::preview::{PreviewStream, DEFAULT_PREVIEW_INTERVAL};

/// Message shown when the user backs out of the picker.
pub const SELECTION_CANCELLED_NOTICE: &str =
    "Device selection cancelled. Connect again when you're ready.";

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// How a connect attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// The user dismissed the picker
    Cancelled,
}

/// Options for building a [`CameraController`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub filter: DeviceFilter,
    pub preview_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            filter: DeviceFilter::default(),
            preview_interval: DEFAULT_PREVIEW_INTERVAL,
        }
    }
}

/// Connect-error message for the user.
fn connect_error_message(error: &CameraError) -> String {
    match error {
        CameraError::PermissionDenied(_) => {
            "Permission to access the camera was denied. Check your USB device permissions."
                .to_string()
        }
        CameraError::Unsupported(_) => {
            "USB device access is not available here, which is required for camera control. \
             Use a platform with USB access or the simulated camera."
                .to_string()
        }
        other => format!("Failed to connect to camera: {}", other),
    }
}

pub struct CameraController {
    session: Arc<CameraSession>,
    preview: PreviewStream,
    capture: CaptureController,
    status: ConnectionStatus,
    last_error: Option<String>,
    notice: Option<String>,
    supported_ops: Option<SupportedOps>,
    config: Option<ConfigNode>,
}

impl CameraController {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        registry: Arc<dyn HandleRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        let session = Arc::new(CameraSession::with_filter(provider, settings.filter));
        let preview = PreviewStream::new(Arc::clone(&session), Arc::clone(&registry))
            .with_interval(settings.preview_interval);
        let capture = CaptureController::new(Arc::clone(&session), registry);

        Self {
            session,
            preview,
            capture,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            notice: None,
            supported_ops: None,
            config: None,
        }
    }

    pub fn session(&self) -> &Arc<CameraSession> {
        &self.session
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Neutral, non-error message (e.g. picker cancelled).
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn config(&self) -> Option<&ConfigNode> {
        self.config.as_ref()
    }

    pub fn supported_ops(&self) -> Option<&SupportedOps> {
        self.supported_ops.as_ref()
    }

    pub fn preview(&self) -> &PreviewStream {
        &self.preview
    }

    pub fn preview_handle(&self) -> Option<String> {
        self.preview.preview_handle()
    }

    pub fn latest_preview(&self) -> Option<Arc<PreviewFrame>> {
        self.preview.latest_frame()
    }

    /// Pick a camera, connect, load its state and start the preview.
    pub async fn connect_camera(&mut self) -> Result<ConnectOutcome, CameraError> {
        self.last_error = None;
        self.notice = None;

        if !self.session.is_supported() {
            let err = CameraError::Unsupported("no USB device access".to_string());
            self.fail_connect(&err);
            return Err(err);
        }

        self.status = ConnectionStatus::Connecting;

        match self.session.show_picker().await {
            Ok(true) => {}
            Ok(false) => {
                self.status = ConnectionStatus::Disconnected;
                self.notice = Some(SELECTION_CANCELLED_NOTICE.to_string());
                return Ok(ConnectOutcome::Cancelled);
            }
            Err(e) => {
                self.fail_connect(&e);
                return Err(e);
            }
        }

        if let Err(e) = self.establish().await {
            self.fail_connect(&e);
            return Err(e);
        }
        Ok(ConnectOutcome::Connected)
    }

    async fn establish(&mut self) -> Result<(), CameraError> {
        self.session.connect().await?;
        self.status = ConnectionStatus::Connected;

        let ops = self.session.get_supported_ops().await?;
        self.config = Some(self.session.get_config().await?);
        self.supported_ops = Some(ops.clone());

        if ops.capture_preview {
            self.preview.start().await?;
        }
        Ok(())
    }

    fn fail_connect(&mut self, error: &CameraError) {
        log::error!("Failed to connect to camera: {}", error);
        self.status = ConnectionStatus::Error;
        self.last_error = Some(connect_error_message(error));
    }

    /// Stop the preview and release the camera.
    pub async fn disconnect_camera(&mut self) -> Result<(), CameraError> {
        self.preview.stop();
        let result = self.session.disconnect().await;
        self.status = ConnectionStatus::Disconnected;
        self.supported_ops = None;
        self.config = None;
        if let Err(e) = &result {
            self.last_error = Some(format!("Failed to disconnect camera: {}", e));
        }
        result
    }

    /// Write one setting, then reload the whole settings tree.
    pub async fn update_setting(
        &mut self,
        name: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), CameraError> {
        self.last_error = None;

        let result = match self.session.set_config_value(name, value).await {
            Ok(()) => self.session.get_config().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(config) => {
                self.config = Some(config);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to update {}: {}", name, e);
                self.last_error = Some(format!("Failed to update {}: {}", name, e));
                Err(e)
            }
        }
    }

    /// Take one full-resolution picture.
    pub async fn capture_image(&mut self) -> Result<CaptureLease, CameraError> {
        self.last_error = None;
        self.capture.capture_image().await.map_err(|e| {
            self.last_error = Some(format!("Failed to capture image: {}", e));
            e
        })
    }

    /// Drain pending camera events.
    pub async fn poll_events(&self) -> Result<bool, CameraError> {
        self.session.consume_events().await
    }
}

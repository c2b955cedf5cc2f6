//! Camera session: exclusive connection to one camera.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};

use super::error::CameraError;
use super::provider::{CameraTransport, CapabilityProvider};
use super::types::{CapturedArtifact, ConfigNode, ConfigValue, DeviceFilter, PreviewFrame, SupportedOps};

/// Connection status broadcast to observers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    /// Connected; `generation` changes on every new connection
    Connected { generation: u64 },
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected { .. })
    }
}

struct Connection {
    transport: Box<dyn CameraTransport>,
    supported_ops: SupportedOps,
    config: ConfigNode,
}

enum SessionState {
    Disconnected,
    Connected(Connection),
}

impl SessionState {
    fn connection(&mut self) -> Result<&mut Connection, CameraError> {
        match self {
            SessionState::Connected(conn) => Ok(conn),
            SessionState::Disconnected => Err(CameraError::NotConnected),
        }
    }
}

/// Owns the transport to a single camera.
///
/// All operations are serialized: only one command is in flight on the
/// transport at a time. Share the session behind an `Arc`.
pub struct CameraSession {
    provider: Arc<dyn CapabilityProvider>,
    filter: DeviceFilter,
    state: Mutex<SessionState>,
    status_tx: watch::Sender<SessionStatus>,
    generation: AtomicU64,
}

impl CameraSession {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self::with_filter(provider, DeviceFilter::default())
    }

    pub fn with_filter(provider: Arc<dyn CapabilityProvider>, filter: DeviceFilter) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            provider,
            filter,
            state: Mutex::new(SessionState::Disconnected),
            status_tx,
            generation: AtomicU64::new(0),
        }
    }

    pub fn filter(&self) -> DeviceFilter {
        self.filter
    }

    /// Whether the runtime can reach USB devices at all.
    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Watch connection status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Ask the user to pick a camera.
    ///
    /// Returns `Ok(false)` if the user cancelled; that is not an error.
    pub async fn show_picker(&self) -> Result<bool, CameraError> {
        self.ensure_supported()?;

        match self.provider.request_device_selection(&self.filter).await {
            Ok(()) => Ok(true),
            Err(CameraError::DeviceSelectionCancelled) => {
                log::info!("User cancelled device selection");
                Ok(false)
            }
            Err(e) => {
                log::error!("Error showing camera picker: {}", e);
                Err(e)
            }
        }
    }

    /// Open the selected camera and load its capabilities and settings.
    ///
    /// Connecting an already connected session is a no-op.
    pub async fn connect(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock().await;
        if let SessionState::Connected(_) = *state {
            log::debug!("connect() on a connected session, keeping existing connection");
            return Ok(());
        }

        self.ensure_supported()?;

        log::info!("Connecting to camera ({})...", self.filter);
        let mut transport = self.provider.open_device().await.map_err(|e| {
            log::error!("Error connecting to camera: {}", e);
            e
        })?;

        let loaded = async {
            let ops = transport.supported_ops().await?;
            let config = transport.read_config().await?;
            Ok::<_, CameraError>((ops, config))
        }
        .await;

        let (supported_ops, config) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("Camera negotiation failed: {}", e);
                if let Err(close_err) = transport.close().await {
                    log::warn!("Failed to close camera after negotiation error: {}", close_err);
                }
                return Err(e);
            }
        };

        *state = SessionState::Connected(Connection {
            transport,
            supported_ops,
            config,
        });

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status_tx.send_replace(SessionStatus::Connected { generation });
        log::info!("Camera connected (session {})", generation);
        Ok(())
    }

    /// Current configuration tree.
    pub async fn get_config(&self) -> Result<ConfigNode, CameraError> {
        let mut state = self.state.lock().await;
        Ok(state.connection()?.config.clone())
    }

    pub async fn get_supported_ops(&self) -> Result<SupportedOps, CameraError> {
        let mut state = self.state.lock().await;
        Ok(state.connection()?.supported_ops.clone())
    }

    /// Write one setting and re-read the whole tree from the camera.
    ///
    /// A rejected write leaves the cached tree untouched. If the camera
    /// accepts the write but the re-read fails, the written value is
    /// applied to the cached tree so it still matches the device.
    pub async fn set_config_value(
        &self,
        name: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), CameraError> {
        let value = value.into();
        let mut state = self.state.lock().await;
        let conn = state.connection()?;

        let normalized = conn.config.validate_write(name, &value).map_err(|e| {
            log::warn!("Rejected config write: {}", e);
            e
        })?;

        log::info!("Setting {} to {}", name, normalized);
        conn.transport.write_config(name, &normalized).await?;
        match conn.transport.read_config().await {
            Ok(config) => {
                conn.config = config;
                Ok(())
            }
            Err(e) => {
                log::warn!("Re-reading config after writing {} failed: {}", name, e);
                conn.config.apply_write(name, &normalized)?;
                Err(e)
            }
        }
    }

    /// Grab one live-view frame.
    pub async fn capture_preview_as_blob(&self) -> Result<PreviewFrame, CameraError> {
        self.with_preview_frame(|frame| frame).await
    }

    /// Grab one live-view frame and hand it to `on_frame` before the
    /// session is released.
    ///
    /// `on_frame` runs while the connection is held, so a concurrent
    /// `disconnect` completes either before the frame is taken or after
    /// `on_frame` returns.
    pub async fn with_preview_frame<T>(
        &self,
        on_frame: impl FnOnce(PreviewFrame) -> T,
    ) -> Result<T, CameraError> {
        let mut state = self.state.lock().await;
        let conn = state.connection()?;
        let data = conn.transport.capture_preview().await?;
        Ok(on_frame(PreviewFrame {
            data,
            mime_type: "image/jpeg".to_string(),
            captured_at: Utc::now(),
        }))
    }

    /// Take one full-resolution picture.
    pub async fn capture_image_as_file(&self) -> Result<CapturedArtifact, CameraError> {
        let mut state = self.state.lock().await;
        let conn = state.connection()?;
        let image = conn.transport.capture_image().await?;
        let artifact = CapturedArtifact::new(image, Utc::now());
        log::info!("Captured {} ({} bytes)", artifact.name, artifact.len());
        Ok(artifact)
    }

    pub async fn consume_events(&self) -> Result<bool, CameraError> {
        let mut state = self.state.lock().await;
        state.connection()?.transport.consume_events().await
    }

    /// Release the camera. Safe to call when already disconnected.
    ///
    /// The session is disconnected afterwards even if closing the transport
    /// reported an error; that error is returned.
    pub async fn disconnect(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, SessionState::Disconnected);

        let SessionState::Connected(mut conn) = previous else {
            return Ok(());
        };

        self.status_tx.send_replace(SessionStatus::Disconnected);
        let result = conn.transport.close().await;
        match &result {
            Ok(()) => log::info!("Camera disconnected"),
            Err(e) => log::error!("Error disconnecting camera: {}", e),
        }
        result
    }

    fn ensure_supported(&self) -> Result<(), CameraError> {
        if self.provider.is_supported() {
            Ok(())
        } else {
            Err(CameraError::Unsupported(
                "this runtime has no USB device access".to_string(),
            ))
        }
    }
}

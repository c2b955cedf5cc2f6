//! Capability provider boundary.
//!
//! The session never talks to USB directly. It depends on three primitives:
//! - device selection ([`CapabilityProvider::request_device_selection`])
//! - an opaque per-device transport ([`CapabilityProvider::open_device`])
//! - protocol commands exchanged over that transport ([`CameraTransport`])
//!
//! A real driver and the simulated camera both sit behind these traits.

use async_trait::async_trait;

use super::error::CameraError;
use super::types::{ConfigNode, ConfigValue, DeviceFilter, ImageData, SupportedOps};

/// Device discovery and access.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Whether USB device access exists in this runtime at all.
    fn is_supported(&self) -> bool;

    /// Let the user choose a device matching `filter`.
    ///
    /// Returns `Err(CameraError::DeviceSelectionCancelled)` when the user
    /// dismisses the picker.
    async fn request_device_selection(&self, filter: &DeviceFilter) -> Result<(), CameraError>;

    /// Open the selected device and negotiate a protocol session.
    async fn open_device(&self) -> Result<Box<dyn CameraTransport>, CameraError>;
}

/// Protocol-level command/response exchange with one opened device.
#[async_trait]
pub trait CameraTransport: Send {
    async fn supported_ops(&mut self) -> Result<SupportedOps, CameraError>;

    async fn read_config(&mut self) -> Result<ConfigNode, CameraError>;

    async fn write_config(&mut self, name: &str, value: &ConfigValue) -> Result<(), CameraError>;

    /// One live-view frame, JPEG encoded.
    async fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError>;

    async fn capture_image(&mut self) -> Result<ImageData, CameraError>;

    /// Drain pending device events. Returns true if any were consumed.
    async fn consume_events(&mut self) -> Result<bool, CameraError>;

    async fn close(&mut self) -> Result<(), CameraError>;
}

//! Camera session management.
//!
//! This module provides the session layer over a camera driver:
//! - The driver boundary via [`CapabilityProvider`] and [`CameraTransport`]
//! - Connection lifecycle and settings via [`CameraSession`]
//! - A simulated camera via [`SimulatedProvider`]

mod error;
mod provider;
mod session;
mod simulated;
mod types;

pub use error::{CameraError, ConfigWriteRejection, Operation};
pub use provider::{CameraTransport, CapabilityProvider};
pub use session::{CameraSession, SessionStatus};
pub use simulated::{default_config_tree, FrameSize, PickerBehavior, SimulatedProvider};
pub use types::{
    extension_for_mime, CapturedArtifact, ConfigKind, ConfigNode, ConfigValue, DeviceFilter,
    ImageData, PreviewFrame, SupportedOps,
};

//! Error types for camera session operations.

use std::fmt;

use thiserror::Error;

/// Camera operations that a device may or may not advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CapturePreview,
    CaptureImage,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CapturePreview => write!(f, "preview capture"),
            Operation::CaptureImage => write!(f, "image capture"),
        }
    }
}

/// Why a configuration write was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWriteRejection {
    /// No node with that name exists in the tree
    NotFound,
    /// The node is a container, not a setting
    NotALeaf,
    /// The node is marked read-only
    ReadOnly,
    /// The value is not one of the node's choices
    NotAChoice { value: String, allowed: Vec<String> },
    /// The value cannot be represented by the node kind
    TypeMismatch { expected: &'static str },
}

impl fmt::Display for ConfigWriteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWriteRejection::NotFound => write!(f, "no such setting"),
            ConfigWriteRejection::NotALeaf => write!(f, "setting is a section, not a value"),
            ConfigWriteRejection::ReadOnly => write!(f, "setting is read-only"),
            ConfigWriteRejection::NotAChoice { value, allowed } => write!(
                f,
                "'{}' is not an allowed choice (expected one of: {})",
                value,
                allowed.join(", ")
            ),
            ConfigWriteRejection::TypeMismatch { expected } => {
                write!(f, "expected a {} value", expected)
            }
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    #[error("Camera not connected")]
    NotConnected,

    /// The user dismissed the device picker. Not a failure.
    #[error("Device selection cancelled")]
    DeviceSelectionCancelled,

    #[error("Permission to access the camera was denied: {0}")]
    PermissionDenied(String),

    /// The runtime has no USB device access at all. Permanent.
    #[error("USB device access is not supported: {0}")]
    Unsupported(String),

    #[error("Camera communication failed: {0}")]
    TransportFailure(String),

    #[error("No camera selected. Choose a device with the picker first")]
    NoDeviceSelected,

    #[error("Cannot set '{name}': {reason}")]
    InvalidConfigWrite {
        /// Name of the targeted setting
        name: String,
        reason: ConfigWriteRejection,
    },

    #[error("Camera does not support {0}")]
    OperationNotSupported(Operation),
}

impl CameraError {
    pub(crate) fn invalid_write(name: &str, reason: ConfigWriteRejection) -> Self {
        CameraError::InvalidConfigWrite {
            name: name.to_string(),
            reason,
        }
    }

    /// True when the error only means the user backed out of device selection.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CameraError::DeviceSelectionCancelled)
    }

    /// True for conditions that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CameraError::Unsupported(_) | CameraError::OperationNotSupported(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_display() {
        assert_eq!(CameraError::NotConnected.to_string(), "Camera not connected");
        assert_eq!(
            CameraError::TransportFailure("timeout".to_string()).to_string(),
            "Camera communication failed: timeout"
        );
        assert_eq!(
            CameraError::OperationNotSupported(Operation::CaptureImage).to_string(),
            "Camera does not support image capture"
        );
    }

    #[test]
    fn test_invalid_write_display_lists_choices() {
        let err = CameraError::invalid_write(
            "iso",
            ConfigWriteRejection::NotAChoice {
                value: "999".to_string(),
                allowed: vec!["100".to_string(), "200".to_string()],
            },
        );
        assert_eq!(
            err.to_string(),
            "Cannot set 'iso': '999' is not an allowed choice (expected one of: 100, 200)"
        );
    }

    #[test]
    fn test_cancellation_is_distinguishable() {
        assert!(CameraError::DeviceSelectionCancelled.is_cancellation());
        assert!(!CameraError::PermissionDenied("denied".to_string()).is_cancellation());
        assert!(!CameraError::NotConnected.is_cancellation());
    }

    #[test]
    fn test_unsupported_is_permanent() {
        assert!(CameraError::Unsupported("no usb".to_string()).is_permanent());
        assert!(!CameraError::TransportFailure("busy".to_string()).is_permanent());
    }
}

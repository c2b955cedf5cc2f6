//! Integration tests for CameraSession against the simulated camera.
//!
//! These tests cover:
//! - Operations on a disconnected session
//! - Connect / disconnect lifecycle and status broadcasts
//! - Config writes: validation, refresh, read-only settings
//! - Picker outcomes

use std::sync::Arc;

use tethercam::camera::{
    CameraError, CameraSession, ConfigValue, ConfigWriteRejection, FrameSize, PickerBehavior,
    SessionStatus, SimulatedProvider, SupportedOps,
};

// === Helpers ===

fn provider() -> SimulatedProvider {
    SimulatedProvider::new()
        .with_preview_size(FrameSize { width: 32, height: 24 })
        .with_capture_size(FrameSize { width: 64, height: 48 })
}

async fn connected(provider: &SimulatedProvider) -> CameraSession {
    let session = CameraSession::new(Arc::new(provider.clone()));
    assert!(session.show_picker().await.unwrap());
    session.connect().await.unwrap();
    session
}

fn iso(session_config: &tethercam::camera::ConfigNode) -> Option<ConfigValue> {
    session_config.find("iso").and_then(|node| node.value.clone())
}

// === Disconnected Session ===

#[tokio::test]
async fn test_operations_require_connection() {
    let session = CameraSession::new(Arc::new(provider()));
    assert!(!session.is_connected());

    assert!(matches!(session.get_config().await, Err(CameraError::NotConnected)));
    assert!(matches!(session.get_supported_ops().await, Err(CameraError::NotConnected)));
    assert!(matches!(
        session.set_config_value("iso", "200").await,
        Err(CameraError::NotConnected)
    ));
    assert!(matches!(
        session.capture_preview_as_blob().await,
        Err(CameraError::NotConnected)
    ));
    assert!(matches!(
        session.capture_image_as_file().await,
        Err(CameraError::NotConnected)
    ));
    assert!(matches!(session.consume_events().await, Err(CameraError::NotConnected)));
}

#[tokio::test]
async fn test_disconnect_when_disconnected_is_ok() {
    let session = CameraSession::new(Arc::new(provider()));
    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

// === Connect / Disconnect ===

#[tokio::test]
async fn test_connect_without_selection_fails() {
    let session = CameraSession::new(Arc::new(provider()));
    assert!(matches!(session.connect().await, Err(CameraError::NoDeviceSelected)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_connect_loads_ops_and_config() {
    let provider = provider();
    let session = connected(&provider).await;

    assert!(session.is_connected());
    assert_eq!(session.get_supported_ops().await.unwrap(), SupportedOps::all());
    let config = session.get_config().await.unwrap();
    assert_eq!(iso(&config), Some(ConfigValue::Text("100".to_string())));
    assert_eq!(provider.open_transports(), 1);
}

#[tokio::test]
async fn test_connect_twice_keeps_one_transport() {
    let provider = provider();
    let session = connected(&provider).await;
    let status = session.status();

    session.connect().await.unwrap();

    assert_eq!(provider.opened_total(), 1);
    assert_eq!(provider.open_transports(), 1);
    assert_eq!(session.status(), status);
}

#[tokio::test]
async fn test_disconnect_closes_transport_and_broadcasts() {
    let provider = provider();
    let session = connected(&provider).await;
    let mut status_rx = session.subscribe();
    assert!(status_rx.borrow_and_update().is_connected());

    session.disconnect().await.unwrap();

    assert_eq!(provider.open_transports(), 0);
    assert!(status_rx.has_changed().unwrap());
    assert_eq!(*status_rx.borrow(), SessionStatus::Disconnected);
    assert!(matches!(session.get_config().await, Err(CameraError::NotConnected)));
}

#[tokio::test]
async fn test_reconnect_gets_new_generation() {
    let provider = provider();
    let session = connected(&provider).await;
    let first = session.status();

    session.disconnect().await.unwrap();
    session.connect().await.unwrap();

    let second = session.status();
    assert!(second.is_connected());
    assert_ne!(first, second);
    assert_eq!(provider.opened_total(), 2);
}

// === Config Writes ===

#[tokio::test]
async fn test_set_valid_choice_refreshes_config() {
    let provider = provider();
    let session = connected(&provider).await;

    session.set_config_value("iso", "200").await.unwrap();

    let config = session.get_config().await.unwrap();
    assert_eq!(iso(&config), Some(ConfigValue::Text("200".to_string())));
    assert_eq!(iso(&provider.device_config()), Some(ConfigValue::Text("200".to_string())));
}

#[tokio::test]
async fn test_set_number_matches_choice_text() {
    let provider = provider();
    let session = connected(&provider).await;

    session.set_config_value("iso", 400.0).await.unwrap();

    let config = session.get_config().await.unwrap();
    assert_eq!(iso(&config), Some(ConfigValue::Text("400".to_string())));
}

#[tokio::test]
async fn test_set_invalid_choice_leaves_config_unchanged() {
    let provider = provider();
    let session = connected(&provider).await;
    let before = session.get_config().await.unwrap();

    let err = session.set_config_value("iso", "999").await.unwrap_err();

    assert!(matches!(err, CameraError::InvalidConfigWrite { ref name, .. } if name == "iso"));
    assert!(err.to_string().contains("iso"));
    assert_eq!(session.get_config().await.unwrap(), before);
    assert_eq!(provider.device_config(), before);
}

#[tokio::test]
async fn test_set_readonly_is_rejected_and_tree_unchanged() {
    let provider = provider();
    let session = connected(&provider).await;
    let before = session.get_config().await.unwrap();

    let err = session.set_config_value("batterylevel", "50%").await.unwrap_err();

    assert!(matches!(
        err,
        CameraError::InvalidConfigWrite {
            reason: ConfigWriteRejection::ReadOnly,
            ..
        }
    ));
    assert_eq!(session.get_config().await.unwrap(), before);
    assert_eq!(provider.device_config(), before);
}

#[tokio::test]
async fn test_failed_reread_keeps_cache_in_sync_with_device() {
    let provider = provider();
    let session = connected(&provider).await;
    provider.fail_next_config_reads(1);

    let err = session.set_config_value("iso", "200").await.unwrap_err();

    assert!(matches!(err, CameraError::TransportFailure(_)));
    let cached = session.get_config().await.unwrap();
    assert_eq!(iso(&cached), Some(ConfigValue::Text("200".to_string())));
    assert_eq!(cached, provider.device_config());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_set_unknown_or_container_is_rejected() {
    let session = connected(&provider()).await;
    assert!(session.set_config_value("nosuchsetting", "1").await.is_err());
    assert!(session.set_config_value("imgsettings", "1").await.is_err());
}

#[tokio::test]
async fn test_set_toggle_and_numeric_normalize() {
    let session = connected(&provider()).await;

    session.set_config_value("reviewtime", "off").await.unwrap();
    session.set_config_value("exposurecompensation", "-0.7").await.unwrap();

    let config = session.get_config().await.unwrap();
    assert_eq!(
        config.find("reviewtime").unwrap().value,
        Some(ConfigValue::Bool(false))
    );
    assert_eq!(
        config.find("exposurecompensation").unwrap().value,
        Some(ConfigValue::Number(-0.7))
    );
    assert!(session.set_config_value("exposurecompensation", "bright").await.is_err());
}

// === Capture and Events ===

#[tokio::test]
async fn test_preview_blob_is_jpeg() {
    let session = connected(&provider()).await;
    let frame = session.capture_preview_as_blob().await.unwrap();
    assert_eq!(frame.mime_type, "image/jpeg");
    assert!(!frame.is_empty());
}

#[tokio::test]
async fn test_capture_image_names_artifact() {
    let session = connected(&provider()).await;
    let artifact = session.capture_image_as_file().await.unwrap();
    assert!(artifact.name.starts_with("capture-"));
    assert!(artifact.name.ends_with(".jpg"));
    assert_eq!(artifact.checksum().len(), 64);
}

#[tokio::test]
async fn test_capture_failure_keeps_connection() {
    let provider = provider();
    let session = connected(&provider).await;
    provider.fail_next_captures(1);

    assert!(matches!(
        session.capture_image_as_file().await,
        Err(CameraError::TransportFailure(_))
    ));
    assert!(session.is_connected());
    assert!(session.capture_image_as_file().await.is_ok());
}

#[tokio::test]
async fn test_consume_events_drains() {
    let session = connected(&provider()).await;
    assert!(session.consume_events().await.unwrap());
    assert!(!session.consume_events().await.unwrap());

    session.set_config_value("iso", "800").await.unwrap();
    assert!(session.consume_events().await.unwrap());
}

// === Picker ===

#[tokio::test]
async fn test_picker_cancel_is_not_an_error() {
    let provider = provider().with_picker(PickerBehavior::Cancel);
    let session = CameraSession::new(Arc::new(provider.clone()));
    assert!(!session.show_picker().await.unwrap());
    assert_eq!(provider.opened_total(), 0);
}

#[tokio::test]
async fn test_picker_denied_is_an_error() {
    let provider = provider().with_picker(PickerBehavior::Deny("blocked".to_string()));
    let session = CameraSession::new(Arc::new(provider));
    assert!(matches!(
        session.show_picker().await,
        Err(CameraError::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_unsupported_runtime() {
    let session = CameraSession::new(Arc::new(provider().unsupported()));
    assert!(!session.is_supported());
    assert!(matches!(session.show_picker().await, Err(CameraError::Unsupported(_))));
    assert!(matches!(session.connect().await, Err(CameraError::Unsupported(_))));
}

//! Simulated camera.
//!
//! Stands in for a real USB driver: a hard-coded configuration tree and
//! synthesized JPEG frames. Also used by the tests to script failures.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use super::error::CameraError;
use super::provider::{CameraTransport, CapabilityProvider};
use super::types::{ConfigNode, ConfigValue, DeviceFilter, ImageData, SupportedOps};

/// What the simulated device picker does when shown.
#[derive(Debug, Clone, PartialEq)]
pub enum PickerBehavior {
    /// The user picks the camera
    Select,
    /// The user dismisses the picker
    Cancel,
    /// The platform refuses access
    Deny(String),
}

/// Frame dimensions of the simulated sensor.
#[derive(Debug, Clone, Copy)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const PREVIEW: FrameSize = FrameSize {
        width: 640,
        height: 480,
    };

    pub const FULL: FrameSize = FrameSize {
        width: 1920,
        height: 1080,
    };
}

/// Static behavior of the simulated camera, fixed when the provider is built.
#[derive(Debug, Clone)]
struct SimulatedOptions {
    supported: bool,
    picker: PickerBehavior,
    paired: bool,
    supported_ops: SupportedOps,
    config: ConfigNode,
    preview_size: FrameSize,
    capture_size: FrameSize,
    latency: Duration,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            supported: true,
            picker: PickerBehavior::Select,
            paired: false,
            supported_ops: SupportedOps::all(),
            config: default_config_tree(),
            preview_size: FrameSize::PREVIEW,
            capture_size: FrameSize::FULL,
            latency: Duration::ZERO,
        }
    }
}

/// State shared between the provider and the transports it opens.
struct SimulatedDevice {
    options: SimulatedOptions,
    paired: AtomicBool,
    config: Mutex<ConfigNode>,
    preview_failures: AtomicU32,
    capture_failures: AtomicU32,
    config_read_failures: AtomicU32,
    previews_served: AtomicU64,
    preview_requests: AtomicU64,
    captures_served: AtomicU64,
    open_transports: AtomicUsize,
    opened_total: AtomicUsize,
}

impl SimulatedDevice {
    fn new(options: SimulatedOptions) -> Self {
        Self {
            paired: AtomicBool::new(options.paired),
            config: Mutex::new(options.config.clone()),
            options,
            preview_failures: AtomicU32::new(0),
            capture_failures: AtomicU32::new(0),
            config_read_failures: AtomicU32::new(0),
            previews_served: AtomicU64::new(0),
            preview_requests: AtomicU64::new(0),
            captures_served: AtomicU64::new(0),
            open_transports: AtomicUsize::new(0),
            opened_total: AtomicUsize::new(0),
        }
    }
}

/// Mock [`CapabilityProvider`] backed by an in-memory camera.
///
/// Clones share the same device. The `with_*` builders return a fresh
/// device, so call them before handing the provider out.
#[derive(Clone)]
pub struct SimulatedProvider {
    device: Arc<SimulatedDevice>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::from_options(SimulatedOptions::default())
    }

    fn from_options(options: SimulatedOptions) -> Self {
        Self {
            device: Arc::new(SimulatedDevice::new(options)),
        }
    }

    fn configure(self, f: impl FnOnce(&mut SimulatedOptions)) -> Self {
        let mut options = self.device.options.clone();
        f(&mut options);
        Self::from_options(options)
    }

    /// Report that the runtime has no USB access.
    pub fn unsupported(self) -> Self {
        self.configure(|o| o.supported = false)
    }

    pub fn with_picker(self, picker: PickerBehavior) -> Self {
        self.configure(|o| o.picker = picker)
    }

    /// Treat the camera as already chosen, so `connect` works without a picker.
    pub fn with_paired_device(self) -> Self {
        self.configure(|o| o.paired = true)
    }

    pub fn with_supported_ops(self, ops: SupportedOps) -> Self {
        self.configure(|o| o.supported_ops = ops)
    }

    pub fn with_config(self, config: ConfigNode) -> Self {
        self.configure(|o| o.config = config)
    }

    pub fn with_preview_size(self, size: FrameSize) -> Self {
        self.configure(|o| o.preview_size = size)
    }

    pub fn with_capture_size(self, size: FrameSize) -> Self {
        self.configure(|o| o.capture_size = size)
    }

    /// Delay every transport command by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.configure(|o| o.latency = latency)
    }

    /// Fail the next `count` preview requests with a busy error.
    pub fn fail_next_previews(&self, count: u32) {
        self.device.preview_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` full captures.
    pub fn fail_next_captures(&self, count: u32) {
        self.device.capture_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` configuration reads.
    pub fn fail_next_config_reads(&self, count: u32) {
        self.device.config_read_failures.store(count, Ordering::SeqCst);
    }

    pub fn previews_served(&self) -> u64 {
        self.device.previews_served.load(Ordering::SeqCst)
    }

    /// Preview requests received, including failed ones.
    pub fn preview_requests(&self) -> u64 {
        self.device.preview_requests.load(Ordering::SeqCst)
    }

    pub fn captures_served(&self) -> u64 {
        self.device.captures_served.load(Ordering::SeqCst)
    }

    /// Transports currently open.
    pub fn open_transports(&self) -> usize {
        self.device.open_transports.load(Ordering::SeqCst)
    }

    /// Transports ever opened.
    pub fn opened_total(&self) -> usize {
        self.device.opened_total.load(Ordering::SeqCst)
    }

    /// Snapshot of the device-side configuration.
    pub fn device_config(&self) -> ConfigNode {
        lock_config(&self.device.config).clone()
    }
}

#[async_trait]
impl CapabilityProvider for SimulatedProvider {
    fn is_supported(&self) -> bool {
        self.device.options.supported
    }

    async fn request_device_selection(&self, filter: &DeviceFilter) -> Result<(), CameraError> {
        if !self.device.options.supported {
            return Err(CameraError::Unsupported(
                "simulated runtime has USB disabled".to_string(),
            ));
        }
        log::debug!("Simulated picker shown for {}", filter);

        match &self.device.options.picker {
            PickerBehavior::Select => {
                self.device.paired.store(true, Ordering::SeqCst);
                Ok(())
            }
            PickerBehavior::Cancel => Err(CameraError::DeviceSelectionCancelled),
            PickerBehavior::Deny(reason) => Err(CameraError::PermissionDenied(reason.clone())),
        }
    }

    async fn open_device(&self) -> Result<Box<dyn CameraTransport>, CameraError> {
        if !self.device.paired.load(Ordering::SeqCst) {
            return Err(CameraError::NoDeviceSelected);
        }
        self.device.open_transports.fetch_add(1, Ordering::SeqCst);
        self.device.opened_total.fetch_add(1, Ordering::SeqCst);
        log::debug!("Simulated camera opened");
        Ok(Box::new(SimulatedTransport {
            device: Arc::clone(&self.device),
            closed: false,
            pending_events: 1,
        }))
    }
}

struct SimulatedTransport {
    device: Arc<SimulatedDevice>,
    closed: bool,
    pending_events: u32,
}

impl SimulatedTransport {
    async fn round_trip(&self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::TransportFailure("device closed".to_string()));
        }
        if !self.device.options.latency.is_zero() {
            tokio::time::sleep(self.device.options.latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CameraTransport for SimulatedTransport {
    async fn supported_ops(&mut self) -> Result<SupportedOps, CameraError> {
        self.round_trip().await?;
        Ok(self.device.options.supported_ops.clone())
    }

    async fn read_config(&mut self) -> Result<ConfigNode, CameraError> {
        self.round_trip().await?;
        if take_failure(&self.device.config_read_failures) {
            return Err(CameraError::TransportFailure("config read timed out".to_string()));
        }
        Ok(lock_config(&self.device.config).clone())
    }

    async fn write_config(&mut self, name: &str, value: &ConfigValue) -> Result<(), CameraError> {
        self.round_trip().await?;
        lock_config(&self.device.config).apply_write(name, value)?;
        self.pending_events += 1;
        Ok(())
    }

    async fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        self.round_trip().await?;
        let request = self.device.preview_requests.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.device.preview_failures) {
            return Err(CameraError::TransportFailure("camera busy".to_string()));
        }
        let data = render_jpeg(self.device.options.preview_size, request)?;
        self.device.previews_served.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn capture_image(&mut self) -> Result<ImageData, CameraError> {
        self.round_trip().await?;
        if take_failure(&self.device.capture_failures) {
            return Err(CameraError::TransportFailure("shutter release failed".to_string()));
        }
        let sequence = self.device.captures_served.fetch_add(1, Ordering::SeqCst);
        let data = render_jpeg(self.device.options.capture_size, sequence)?;
        self.pending_events += 1;
        Ok(ImageData {
            data,
            mime_type: "image/jpeg".to_string(),
        })
    }

    async fn consume_events(&mut self) -> Result<bool, CameraError> {
        self.round_trip().await?;
        let had_events = self.pending_events > 0;
        self.pending_events = 0;
        Ok(had_events)
    }

    async fn close(&mut self) -> Result<(), CameraError> {
        if !self.closed {
            self.closed = true;
            self.device.open_transports.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Simulated camera closed");
        }
        Ok(())
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        if !self.closed {
            self.device.open_transports.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

fn lock_config(config: &Mutex<ConfigNode>) -> std::sync::MutexGuard<'_, ConfigNode> {
    config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Draw a test card with a bar that moves with `sequence` and encode it.
fn render_jpeg(size: FrameSize, sequence: u64) -> Result<Vec<u8>, CameraError> {
    let FrameSize { width, height } = size;
    let bar_width = (width / 16).max(1);
    let bar_x = ((sequence * u64::from(bar_width)) % u64::from(width.max(1))) as u32;

    let img = RgbImage::from_fn(width, height, |x, y| {
        if x >= bar_x && x < bar_x + bar_width {
            Rgb([0x33, 0x33, 0x33])
        } else {
            let shade = 0xe0 + ((x + y) % 0x10) as u8;
            Rgb([shade, shade, shade])
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| CameraError::TransportFailure(format!("frame encoding failed: {}", e)))?;
    Ok(buf.into_inner())
}

/// Settings tree exposed by the simulated camera.
pub fn default_config_tree() -> ConfigNode {
    ConfigNode::container("main", "Camera")
        .with_info("Camera configuration")
        .with_child(
            ConfigNode::container("imgsettings", "Image Settings")
                .with_info("Image settings")
                .with_child(
                    ConfigNode::choice(
                        "iso",
                        "ISO",
                        "100",
                        &[
                            ("100", "ISO 100"),
                            ("200", "ISO 200"),
                            ("400", "ISO 400"),
                            ("800", "ISO 800"),
                        ],
                    )
                    .with_info("ISO speed"),
                )
                .with_child(ConfigNode::choice(
                    "whitebalance",
                    "White Balance",
                    "Auto",
                    &[
                        ("Auto", "Auto"),
                        ("Daylight", "Daylight"),
                        ("Shade", "Shade"),
                        ("Tungsten", "Tungsten"),
                    ],
                )),
        )
        .with_child(
            ConfigNode::container("capturesettings", "Capture Settings")
                .with_child(ConfigNode::choice(
                    "shutterspeed",
                    "Shutter Speed",
                    "1/125",
                    &[
                        ("1/30", "1/30"),
                        ("1/60", "1/60"),
                        ("1/125", "1/125"),
                        ("1/250", "1/250"),
                        ("1/500", "1/500"),
                    ],
                ))
                .with_child(ConfigNode::choice(
                    "aperture",
                    "Aperture",
                    "5.6",
                    &[("2.8", "f/2.8"), ("4", "f/4"), ("5.6", "f/5.6"), ("8", "f/8")],
                ))
                .with_child(ConfigNode::numeric("exposurecompensation", "Exposure Compensation", 0.0)),
        )
        .with_child(
            ConfigNode::container("settings", "Camera Settings")
                .with_child(ConfigNode::text("artist", "Artist", ""))
                .with_child(ConfigNode::toggle("reviewtime", "Image Review", true)),
        )
        .with_child(
            ConfigNode::container("status", "Camera Status")
                .with_child(ConfigNode::text("cameramodel", "Camera Model", "Simulated DSLR").read_only())
                .with_child(ConfigNode::text("batterylevel", "Battery Level", "100%").read_only()),
        )
}

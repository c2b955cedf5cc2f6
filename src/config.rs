//! Configuration file handling for tethercam.
//!
//! Loads configuration from `<config dir>/tethercam/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::DeviceFilter;
use crate::controller::ControllerSettings;
use crate::upload::{DEFAULT_UPLOAD_URL, UPLOAD_URL_ENV};

/// Configuration file structure for tethercam.
#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct CameraConfig {
    /// Time between preview requests
    #[serde(default = "default_preview_interval_ms")]
    pub preview_interval_ms: u64,
    /// USB interface class of the camera
    #[serde(default = "default_class_code")]
    pub class_code: u8,
    #[serde(default = "default_subclass_code")]
    pub subclass_code: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preview_interval_ms: default_preview_interval_ms(),
            class_code: default_class_code(),
            subclass_code: default_subclass_code(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct CaptureConfig {
    /// Where captured images are saved (default: current directory)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct UploadConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_preview_interval_ms() -> u64 {
    500
}

fn default_class_code() -> u8 {
    DeviceFilter::PTP.class_code
}

fn default_subclass_code() -> u8 {
    DeviceFilter::PTP.subclass_code
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            filter: DeviceFilter {
                class_code: self.camera.class_code,
                subclass_code: self.camera.subclass_code,
            },
            preview_interval: Duration::from_millis(self.camera.preview_interval_ms),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.capture
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Upload endpoint: the environment wins over the file, then the default.
    pub fn upload_endpoint(&self) -> String {
        std::env::var(UPLOAD_URL_ENV)
            .ok()
            .or_else(|| self.upload.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("tethercam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/tethercam/config.toml")
        })
}

/// Contents written by `tethercam config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# tethercam configuration

[camera]
# Milliseconds between live preview requests
preview_interval_ms = 500
# USB interface filter for the device picker (6/1 = PTP/MTP still image)
class_code = 6
subclass_code = 1

[capture]
# Directory captured images are saved to
# output_dir = "~/Pictures/tethercam"

[upload]
# Endpoint receiving multipart uploads (overridden by TETHERCAM_UPLOAD_URL)
# endpoint = "http://localhost:3000/api/upload-raw"
"#;

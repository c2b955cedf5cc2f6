//! Camera types and data structures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{CameraError, ConfigWriteRejection, Operation};

/// USB interface filter handed to the device picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    /// USB interface class (6 = still image)
    pub class_code: u8,
    /// USB interface subclass (1 = PTP/MTP)
    pub subclass_code: u8,
}

impl DeviceFilter {
    /// Still-image class cameras speaking PTP/MTP.
    pub const PTP: DeviceFilter = DeviceFilter {
        class_code: 6,
        subclass_code: 1,
    };
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::PTP
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {:#04x}/subclass {:#04x}", self.class_code, self.subclass_code)
    }
}

/// Operations the connected camera advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedOps {
    #[serde(default)]
    pub capture_preview: bool,
    #[serde(default)]
    pub capture_image: bool,
    /// Driver-specific flags we do not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, bool>,
}

impl SupportedOps {
    /// Preview and full capture both available.
    pub fn all() -> Self {
        Self {
            capture_preview: true,
            capture_image: true,
            extra: BTreeMap::new(),
        }
    }

    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::CapturePreview => self.capture_preview,
            Operation::CaptureImage => self.capture_image,
        }
    }
}

/// Widget kind of a configuration node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKind {
    #[serde(rename = "window", alias = "section")]
    Container,
    #[serde(rename = "radio", alias = "menu")]
    Choice,
    #[serde(rename = "range")]
    Numeric,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "toggle")]
    Toggle,
    #[serde(rename = "date")]
    Date,
}

/// A setting value as reported by the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Number(n) => write!(f, "{}", n),
            ConfigValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Text(s)
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Number(n)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl ConfigValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            ConfigValue::Text(s) => s.trim().parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }

    fn as_toggle(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Number(n) if *n == 0.0 => Some(false),
            ConfigValue::Number(n) if *n == 1.0 => Some(true),
            ConfigValue::Number(_) => None,
            ConfigValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "1" | "true" | "on" => Some(true),
                "0" | "false" | "off" => Some(false),
                _ => None,
            },
        }
    }
}

/// One node of the camera configuration tree.
///
/// Containers carry `children`; leaves carry `value`. Choice leaves list
/// their allowed values in `choices` (value -> label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    /// Description
    #[serde(default)]
    pub info: String,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub readonly: bool,
    #[serde(rename = "type")]
    pub kind: ConfigKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ConfigNode>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, String>,
}

impl ConfigNode {
    fn leaf(name: &str, label: &str, kind: ConfigKind, value: ConfigValue) -> Self {
        Self {
            name: name.to_string(),
            info: String::new(),
            label: label.to_string(),
            readonly: false,
            kind,
            value: Some(value),
            children: BTreeMap::new(),
            choices: BTreeMap::new(),
        }
    }

    pub fn container(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            info: String::new(),
            label: label.to_string(),
            readonly: false,
            kind: ConfigKind::Container,
            value: None,
            children: BTreeMap::new(),
            choices: BTreeMap::new(),
        }
    }

    pub fn choice(name: &str, label: &str, value: &str, choices: &[(&str, &str)]) -> Self {
        let mut node = Self::leaf(name, label, ConfigKind::Choice, value.into());
        node.choices = choices
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        node
    }

    pub fn text(name: &str, label: &str, value: &str) -> Self {
        Self::leaf(name, label, ConfigKind::Text, value.into())
    }

    pub fn numeric(name: &str, label: &str, value: f64) -> Self {
        Self::leaf(name, label, ConfigKind::Numeric, value.into())
    }

    pub fn toggle(name: &str, label: &str, value: bool) -> Self {
        Self::leaf(name, label, ConfigKind::Toggle, value.into())
    }

    pub fn with_info(mut self, info: &str) -> Self {
        self.info = info.to_string();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.insert(child.name.clone(), child);
        self
    }

    pub fn is_container(&self) -> bool {
        self.kind == ConfigKind::Container
    }

    /// Find a node by name anywhere below (and including) this one.
    pub fn find(&self, name: &str) -> Option<&ConfigNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.values().find_map(|child| child.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ConfigNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .values_mut()
            .find_map(|child| child.find_mut(name))
    }

    /// All leaf settings, depth first.
    pub fn leaves(&self) -> Vec<&ConfigNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConfigNode>) {
        if self.is_container() {
            for child in self.children.values() {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }

    /// Check that `value` may be written to the node `name`.
    ///
    /// Returns the value normalized to the node kind.
    pub fn validate_write(&self, name: &str, value: &ConfigValue) -> Result<ConfigValue, CameraError> {
        let node = self
            .find(name)
            .ok_or_else(|| CameraError::invalid_write(name, ConfigWriteRejection::NotFound))?;

        if node.is_container() {
            return Err(CameraError::invalid_write(name, ConfigWriteRejection::NotALeaf));
        }
        if node.readonly {
            return Err(CameraError::invalid_write(name, ConfigWriteRejection::ReadOnly));
        }

        let mismatch = |expected| CameraError::invalid_write(name, ConfigWriteRejection::TypeMismatch { expected });

        match node.kind {
            ConfigKind::Choice => {
                let key = value.to_string();
                if node.choices.contains_key(&key) {
                    Ok(ConfigValue::Text(key))
                } else {
                    Err(CameraError::invalid_write(
                        name,
                        ConfigWriteRejection::NotAChoice {
                            value: key,
                            allowed: node.choices.keys().cloned().collect(),
                        },
                    ))
                }
            }
            ConfigKind::Numeric | ConfigKind::Date => value
                .as_number()
                .map(ConfigValue::Number)
                .ok_or_else(|| mismatch("numeric")),
            ConfigKind::Toggle => value
                .as_toggle()
                .map(ConfigValue::Bool)
                .ok_or_else(|| mismatch("on/off")),
            ConfigKind::Text => Ok(ConfigValue::Text(value.to_string())),
            ConfigKind::Container => unreachable!("containers rejected above"),
        }
    }

    /// Validate and store `value` at node `name`.
    pub fn apply_write(&mut self, name: &str, value: &ConfigValue) -> Result<(), CameraError> {
        let normalized = self.validate_write(name, value)?;
        if let Some(node) = self.find_mut(name) {
            node.value = Some(normalized);
        }
        Ok(())
    }
}

/// Raw image bytes returned by the transport for a full capture.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A single low-resolution live-view frame.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// Encoded image bytes (JPEG)
    pub data: Vec<u8>,
    pub mime_type: String,
    /// When the frame was produced
    pub captured_at: DateTime<Utc>,
}

impl PreviewFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Full-resolution output of one capture.
#[derive(Debug, Clone)]
pub struct CapturedArtifact {
    /// Synthesized file name, e.g. `capture-1718000000000.jpg`
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl CapturedArtifact {
    /// Name the image after its capture time.
    pub fn new(image: ImageData, captured_at: DateTime<Utc>) -> Self {
        let name = format!(
            "capture-{}.{}",
            captured_at.timestamp_millis(),
            extension_for_mime(&image.mime_type)
        );
        Self {
            name,
            mime_type: image.mime_type,
            data: image.data,
            captured_at,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// Hex SHA-256 of the image bytes.
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// File extension for a camera image MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/tiff" => "tif",
        "image/x-canon-cr2" => "cr2",
        "image/x-canon-cr3" => "cr3",
        "image/x-nikon-nef" => "nef",
        "image/x-sony-arw" => "arw",
        "image/x-adobe-dng" => "dng",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn iso_tree() -> ConfigNode {
        ConfigNode::container("main", "Camera").with_child(
            ConfigNode::container("imgsettings", "Image Settings")
                .with_child(ConfigNode::choice(
                    "iso",
                    "ISO",
                    "100",
                    &[("100", "ISO 100"), ("200", "ISO 200"), ("400", "ISO 400"), ("800", "ISO 800")],
                ))
                .with_child(ConfigNode::text("serialnumber", "Serial", "A1").read_only())
                .with_child(ConfigNode::numeric("exposurecompensation", "EV", 0.0))
                .with_child(ConfigNode::toggle("autofocus", "AF", true)),
        )
    }

    #[test]
    fn test_find_nested_node() {
        let tree = iso_tree();
        let iso = tree.find("iso").expect("iso exists");
        assert_eq!(iso.value, Some(ConfigValue::Text("100".to_string())));
        assert!(tree.find("missing").is_none());
    }

    #[test]
    fn test_leaves_skips_containers() {
        let tree = iso_tree();
        let names: Vec<&str> = tree.leaves().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names.len(), 4);
        assert!(!names.contains(&"imgsettings"));
    }

    #[test]
    fn test_apply_write_choice() {
        let mut tree = iso_tree();
        tree.apply_write("iso", &"400".into()).unwrap();
        assert_eq!(tree.find("iso").unwrap().value, Some(ConfigValue::Text("400".to_string())));
    }

    #[test]
    fn test_numeric_value_matches_choice_key() {
        let tree = iso_tree();
        let normalized = tree.validate_write("iso", &ConfigValue::Number(200.0)).unwrap();
        assert_eq!(normalized, ConfigValue::Text("200".to_string()));
    }

    #[test]
    fn test_write_rejections() {
        let tree = iso_tree();
        let reason = |name: &str, value: ConfigValue| match tree.validate_write(name, &value) {
            Err(CameraError::InvalidConfigWrite { reason, .. }) => reason,
            other => panic!("expected InvalidConfigWrite, got {:?}", other),
        };

        assert_eq!(reason("nope", "1".into()), ConfigWriteRejection::NotFound);
        assert_eq!(reason("imgsettings", "1".into()), ConfigWriteRejection::NotALeaf);
        assert_eq!(reason("serialnumber", "B2".into()), ConfigWriteRejection::ReadOnly);
        assert!(matches!(
            reason("iso", "999".into()),
            ConfigWriteRejection::NotAChoice { .. }
        ));
        assert_eq!(
            reason("exposurecompensation", "bright".into()),
            ConfigWriteRejection::TypeMismatch { expected: "numeric" }
        );
        assert_eq!(
            reason("autofocus", "maybe".into()),
            ConfigWriteRejection::TypeMismatch { expected: "on/off" }
        );
    }

    #[test]
    fn test_failed_write_leaves_tree_unchanged() {
        let mut tree = iso_tree();
        let before = tree.clone();
        assert!(tree.apply_write("iso", &"999".into()).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn test_toggle_and_numeric_normalization() {
        let mut tree = iso_tree();
        tree.apply_write("autofocus", &"off".into()).unwrap();
        tree.apply_write("exposurecompensation", &"-1.5".into()).unwrap();
        assert_eq!(tree.find("autofocus").unwrap().value, Some(ConfigValue::Bool(false)));
        assert_eq!(
            tree.find("exposurecompensation").unwrap().value,
            Some(ConfigValue::Number(-1.5))
        );
    }

    #[test]
    fn test_config_tree_json_shape() {
        let json = serde_json::json!({
            "name": "main",
            "info": "Camera configuration",
            "label": "Camera",
            "readonly": false,
            "type": "window",
            "children": {
                "iso": {
                    "name": "iso",
                    "info": "ISO speed",
                    "label": "ISO",
                    "readonly": false,
                    "type": "radio",
                    "value": "100",
                    "choices": { "100": "ISO 100", "200": "ISO 200" }
                },
                "model": {
                    "name": "model",
                    "label": "Model",
                    "readonly": true,
                    "type": "text",
                    "value": "EOS"
                }
            }
        });
        let tree: ConfigNode = serde_json::from_value(json).unwrap();
        assert_eq!(tree.kind, ConfigKind::Container);
        let iso = tree.find("iso").unwrap();
        assert_eq!(iso.kind, ConfigKind::Choice);
        assert_eq!(iso.choices.len(), 2);
        assert!(tree.find("model").unwrap().readonly);
    }

    #[test]
    fn test_supported_ops_json_keys() {
        let ops: SupportedOps =
            serde_json::from_value(serde_json::json!({"capturePreview": true, "captureImage": false, "triggerCapture": true}))
                .unwrap();
        assert!(ops.capture_preview);
        assert!(!ops.capture_image);
        assert_eq!(ops.extra.get("triggerCapture"), Some(&true));
        assert!(ops.supports(Operation::CapturePreview));
    }

    #[test]
    fn test_artifact_name_uses_capture_time() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let artifact = CapturedArtifact::new(
            ImageData {
                data: vec![1, 2, 3],
                mime_type: "image/x-canon-cr2".to_string(),
            },
            at,
        );
        assert_eq!(artifact.name, "capture-1700000000123.cr2");
        assert_eq!(artifact.len(), 3);
        assert_eq!(artifact.checksum().len(), 64);
    }

    #[test]
    fn test_extension_for_unknown_mime() {
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
    }

    #[test]
    fn test_device_filter_default_is_ptp() {
        let filter = DeviceFilter::default();
        assert_eq!(filter.class_code, 6);
        assert_eq!(filter.subclass_code, 1);
    }
}

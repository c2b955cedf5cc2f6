//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Control a tethered camera: settings, live preview and capture
#[derive(Parser, Debug)]
#[command(name = "tethercam")]
#[command(version, about = "Tethered camera control", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print the camera's capabilities and settings
    Info {
        /// Print the settings tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one camera setting
    Set {
        /// Setting name (e.g. iso)
        name: String,
        /// New value (must be one of the listed choices for choice settings)
        value: String,
    },
    /// Take a full-resolution picture
    Capture {
        /// Directory to save the picture to
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Upload the picture instead of saving it
        #[arg(long, conflicts_with = "output")]
        upload: bool,
        /// Upload endpoint (overrides config and TETHERCAM_UPLOAD_URL)
        #[arg(long, requires = "upload")]
        endpoint: Option<String>,
    },
    /// Stream live preview frames
    Preview {
        /// Seconds to stream (Ctrl-C stops early)
        #[arg(long, short, default_value = "5")]
        duration: u64,
        /// Save the last preview frame into this directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let args = Args::try_parse_from(["tethercam", "set", "iso", "200"]).unwrap();
        match args.command {
            Command::Set { name, value } => {
                assert_eq!(name, "iso");
                assert_eq!(value, "200");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_capture_upload_conflicts_with_output() {
        let result = Args::try_parse_from(["tethercam", "capture", "--upload", "--output", "out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_requires_upload() {
        assert!(Args::try_parse_from(["tethercam", "capture", "--endpoint", "http://x"]).is_err());
        assert!(
            Args::try_parse_from(["tethercam", "capture", "--upload", "--endpoint", "http://x"]).is_ok()
        );
    }

    #[test]
    fn test_preview_default_duration() {
        let args = Args::try_parse_from(["tethercam", "preview"]).unwrap();
        assert!(matches!(args.command, Command::Preview { duration: 5, output: None }));
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::try_parse_from(["tethercam", "info", "--config", "c.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
    }
}

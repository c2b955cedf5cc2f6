//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tethercam::camera::{ConfigNode, SimulatedProvider};
use tethercam::config::{default_path, Config, DEFAULT_CONFIG_TOML};
use tethercam::controller::{CameraController, ConnectOutcome};
use tethercam::handles::TrackingRegistry;
use tethercam::upload::UploadClient;

use super::args::{Args, Command, ConfigAction};

/// How often the preview command reports progress.
const PREVIEW_REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Run the parsed command line.
pub fn run(args: Args) -> Result<(), String> {
    if let Command::Config { action } = &args.command {
        return handle_config_action(action, args.config.as_deref());
    }

    let config = Config::load(args.config.as_deref()).map_err(|e| e.to_string())?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        match args.command {
            Command::Info { json } => show_info(&config, json).await,
            Command::Set { name, value } => set_value(&config, &name, value).await,
            Command::Capture {
                output,
                upload,
                endpoint,
            } => capture(&config, output, upload, endpoint).await,
            Command::Preview { duration, output } => preview(&config, duration, output).await,
            Command::Config { .. } => Ok(()),
        }
    })
}

fn build_controller(config: &Config) -> (CameraController, Arc<TrackingRegistry>) {
    let registry = Arc::new(TrackingRegistry::new());
    let controller = CameraController::new(
        Arc::new(SimulatedProvider::new()),
        registry.clone(),
        config.controller_settings(),
    );
    (controller, registry)
}

/// Connect, printing the neutral notice if the user backs out.
async fn connect(controller: &mut CameraController) -> Result<bool, String> {
    match controller.connect_camera().await {
        Ok(ConnectOutcome::Connected) => Ok(true),
        Ok(ConnectOutcome::Cancelled) => {
            if let Some(notice) = controller.notice() {
                println!("{}", notice);
            }
            Ok(false)
        }
        Err(e) => Err(controller
            .last_error()
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())),
    }
}

async fn disconnect(controller: &mut CameraController) {
    if let Err(e) = controller.disconnect_camera().await {
        log::warn!("Disconnect reported an error: {}", e);
    }
}

async fn show_info(config: &Config, json: bool) -> Result<(), String> {
    let (mut controller, _registry) = build_controller(config);
    if !connect(&mut controller).await? {
        return Ok(());
    }

    let tree = controller.config().cloned();
    let ops = controller.supported_ops().cloned().unwrap_or_default();

    if json {
        let out = serde_json::json!({
            "supportedOps": ops,
            "config": tree,
        });
        let text = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        println!("Status: {}", controller.status());
        println!(
            "Preview: {}",
            if ops.capture_preview { "supported" } else { "not supported" }
        );
        println!(
            "Capture: {}",
            if ops.capture_image { "supported" } else { "not supported" }
        );
        if let Some(tree) = &tree {
            println!();
            print_tree(tree, 0);
        }
    }

    disconnect(&mut controller).await;
    Ok(())
}

fn print_tree(node: &ConfigNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = if node.label.is_empty() { &node.name } else { &node.label };

    if node.is_container() {
        println!("{}{} ({})", indent, label, node.name);
        for child in node.children.values() {
            print_tree(child, depth + 1);
        }
        return;
    }

    let value = node
        .value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    let mut line = format!("{}{} ({}) = {}", indent, label, node.name, value);
    if !node.choices.is_empty() {
        let choices: Vec<&str> = node.choices.keys().map(String::as_str).collect();
        line.push_str(&format!(" [{}]", choices.join(", ")));
    }
    if node.readonly {
        line.push_str(" (read-only)");
    }
    println!("{}", line);
}

async fn set_value(config: &Config, name: &str, value: String) -> Result<(), String> {
    let (mut controller, _registry) = build_controller(config);
    if !connect(&mut controller).await? {
        return Ok(());
    }

    let result = controller.update_setting(name, value).await;
    let updated = controller
        .config()
        .and_then(|tree| tree.find(name))
        .and_then(|node| node.value.clone());
    disconnect(&mut controller).await;

    result.map_err(|e| e.to_string())?;
    if let Some(v) = updated {
        println!("{} = {}", name, v);
    }
    Ok(())
}

async fn capture(
    config: &Config,
    output: Option<PathBuf>,
    upload: bool,
    endpoint: Option<String>,
) -> Result<(), String> {
    let (mut controller, _registry) = build_controller(config);
    if !connect(&mut controller).await? {
        return Ok(());
    }

    let result = deliver_capture(&mut controller, config, output, upload, endpoint).await;
    disconnect(&mut controller).await;
    result
}

async fn deliver_capture(
    controller: &mut CameraController,
    config: &Config,
    output: Option<PathBuf>,
    upload: bool,
    endpoint: Option<String>,
) -> Result<(), String> {
    let lease = controller.capture_image().await.map_err(|e| {
        controller
            .last_error()
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())
    })?;

    let artifact = lease.artifact();
    println!("Captured: {}", artifact.name);
    println!("  Size: {:.2} MB", artifact.size_mb());
    println!("  Type: {}", artifact.mime_type);
    println!("  SHA-256: {}", artifact.checksum());

    if upload {
        let endpoint = endpoint.unwrap_or_else(|| config.upload_endpoint());
        let client = UploadClient::with_endpoint(endpoint).map_err(|e| e.to_string())?;
        let receipt = lease
            .upload(&client)
            .await
            .map_err(|e| format!("Upload Error: {}", e))?;
        println!("Upload successful! URL: {}", receipt.url);
    } else {
        let dir = output.unwrap_or_else(|| config.output_dir());
        let path = lease
            .save_to(&dir)
            .await
            .map_err(|e| format!("Failed to save image to '{}': {}", dir.display(), e))?;
        println!("Saved to: {}", path.display());
    }
    Ok(())
}

async fn preview(config: &Config, duration: u64, output: Option<PathBuf>) -> Result<(), String> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| format!("Failed to set Ctrl-C handler: {}", e))?;

    let (mut controller, registry) = build_controller(config);
    if !connect(&mut controller).await? {
        return Ok(());
    }

    if !controller.preview().is_streaming() {
        disconnect(&mut controller).await;
        return Err("Preview not supported by this camera".to_string());
    }

    println!("Streaming preview for {}s (Ctrl-C to stop)...", duration);
    let deadline = Instant::now() + Duration::from_secs(duration);
    while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
        tokio::time::sleep(PREVIEW_REPORT_INTERVAL).await;
        if let Some(frame) = controller.latest_preview() {
            log::debug!(
                "Latest frame {} bytes at {}",
                frame.len(),
                frame.captured_at.format("%H:%M:%S%.3f")
            );
        }
    }

    let saved = match (&output, controller.latest_preview()) {
        (Some(dir), Some(frame)) => Some(save_preview(dir, &frame.data, frame.captured_at.timestamp_millis()).await?),
        _ => None,
    };
    let frames = controller.preview().frames_received();

    disconnect(&mut controller).await;

    println!("Received {} preview frame(s)", frames);
    if let Some(path) = saved {
        println!("Last frame saved to: {}", path.display());
    }
    log::debug!(
        "Handles created: {}, revoked: {}, live: {}",
        registry.created(),
        registry.revoked(),
        registry.live()
    );
    Ok(())
}

async fn save_preview(dir: &Path, data: &[u8], millis: i64) -> Result<PathBuf, String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("Error creating output directory: {}", e))?;
    let path = dir.join(format!("preview-{}.jpg", millis));
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| format!("Error writing preview frame: {}", e))?;
    Ok(path)
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: &ConfigAction, path: Option<&Path>) -> Result<(), String> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path)).map_err(|e| e.to_string())?;
            println!("Current configuration:");
            println!("  Preview interval: {} ms", config.camera.preview_interval_ms);
            println!(
                "  Device filter: class {} / subclass {}",
                config.camera.class_code, config.camera.subclass_code
            );
            println!("  Output directory: {}", config.output_dir().display());
            println!("  Upload endpoint: {}", config.upload_endpoint());
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'tethercam config show' to view current settings.",
                    config_path.display()
                ));
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }

            std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
                .map_err(|e| format!("Error writing config file: {}", e))?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

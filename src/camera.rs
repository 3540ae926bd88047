//! Frame sources for the orchestrator.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

use crate::common::utils::private_path;
use crate::config::{CameraConfig, CameraSource};

/// Something that can produce a frame on disk.
#[cfg_attr(test, mockall::automock)]
pub trait Camera {
    /// Capture one frame and return its path. A preview is a cheaper,
    /// reduced-resolution frame used while framing.
    fn capture(&mut self, config: &CameraConfig, preview: bool) -> Result<PathBuf>;
}

/// Runs an `rpicam-still` compatible command.
#[derive(Debug, Default)]
pub struct CommandCamera;

impl CommandCamera {
    pub(crate) fn arguments(config: &CameraConfig, preview: bool) -> Result<Vec<String>> {
        let (mut width, mut height) = config.dimensions()?;
        if preview {
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
        let shutter_us = (config.shutter_speed * 1_000_000.0).round() as u64;
        let gain = f64::from(config.iso_speed) / 100.0;

        Ok(vec![
            "-o".to_string(),
            config.output.display().to_string(),
            "--shutter".to_string(),
            shutter_us.to_string(),
            "--gain".to_string(),
            gain.to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "-n".to_string(),
            "--immediate".to_string(),
        ])
    }
}

impl Camera for CommandCamera {
    fn capture(&mut self, config: &CameraConfig, preview: bool) -> Result<PathBuf> {
        if let Some(parent) = config.output.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create capture directory {}", parent.display())
            })?;
        }

        let args = Self::arguments(config, preview)?;
        log_debug!("Capturing: {} {}", config.command, args.join(" "));

        let output = Command::new(&config.command)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run capture command '{}'", config.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Capture command '{}' failed ({}): {}",
                config.command,
                output.status,
                stderr.trim()
            );
        }
        if !config.output.is_file() {
            anyhow::bail!(
                "Capture command '{}' produced no image at {}",
                config.command,
                private_path(&config.output)
            );
        }

        Ok(config.output.clone())
    }
}

/// Returns the configured image every time.
#[derive(Debug, Default)]
pub struct FileCamera;

impl Camera for FileCamera {
    fn capture(&mut self, config: &CameraConfig, _preview: bool) -> Result<PathBuf> {
        let image = config
            .image
            .as_ref()
            .context("camera.image must be set when camera.source is \"file\"")?;
        if !image.is_file() {
            anyhow::bail!("Configured image {} does not exist", private_path(image));
        }
        Ok(image.clone())
    }
}

/// The camera implementation for the configured source.
pub fn from_config(config: &CameraConfig) -> Box<dyn Camera> {
    match config.source {
        CameraSource::Command => Box::new(CommandCamera),
        CameraSource::File => Box::new(FileCamera),
    }
}

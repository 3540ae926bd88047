//! Configuration system for skysolve.
//!
//! Settings live in a single TOML file, by default
//! `$XDG_CONFIG_HOME/skysolve/skysolve.toml`, overridable with `--config`.
//! A missing file is created with commented defaults on first start.
//!
//! ## Configuration Structure
//!
//! ```toml
//! mode = "solve"            # solve | align | test
//! cycle_interval = 2.0      # Seconds between cycles
//! error_backoff = 10.0      # Seconds to wait after a failed cycle
//! status_file = "/tmp/skysolve/status.json"
//!
//! [solver]
//! type = "astrometry"       # astrometry | demo
//! command = "solve-field"
//! timeout = 60              # Hard wall clock per phase, seconds
//! hint_timeout = 10         # Seconds a cached pointing stays usable as a hint
//! solve_radius = 20.0       # Search radius around the hint, degrees
//! fallback = true           # Retry unhinted on the extracted star list
//!
//! [camera]
//! source = "command"        # command | file
//! shutter_speed = 1.0
//! iso_speed = 800
//! image_size = "1280x960"
//!
//! [lx200]
//! port = 5002
//!
//! [mount]
//! enabled = false
//! sync_mode = "sync"        # sync | slew_then_sync
//!
//! [logging]
//! debug = false
//! ```
//!
//! Every section carries `#[serde(default)]`, so a partial file merges
//! field-by-field onto the defaults and unknown keys are ignored.
//!
//! ## Reloading
//!
//! The daemon holds a [`ConfigStore`] and calls [`ConfigStore::refresh`] at
//! the top of every cycle. The file is re-read only when its modification
//! time changed; a file that fails to parse or validate is reported and the
//! previous snapshot stays in effect.

pub mod builder;
pub mod loading;
pub mod validation;
pub mod watcher;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::*;
use crate::common::utils::{private_path, seconds};
use crate::model::Mode;

// Re-export public API
pub use builder::{create_default_config, update_mode};
pub use loading::{ConfigStore, get_config_path, load, load_from_path, set_config_path};
pub use watcher::start_config_watcher;

/// Which solver implementation a cycle uses.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// External astrometry.net `solve-field` binary
    #[default]
    Astrometry,
    /// Synthesized fixed result, no external process
    Demo,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Astrometry => "astrometry",
            SolverKind::Demo => "demo",
        }
    }
}

/// Where frames come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// Run the still-capture command
    #[default]
    Command,
    /// Reuse a fixed image on disk
    File,
}

impl CameraSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraSource::Command => "command",
            CameraSource::File => "file",
        }
    }
}

/// How a fresh solve is pushed to the mount.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Set target and sync immediately
    #[default]
    Sync,
    /// Set target, slew there, wait for the slew to finish, then sync
    SlewThenSync,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Sync => "sync",
            SyncMode::SlewThenSync => "slew_then_sync",
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    #[serde(rename = "type")]
    pub kind: SolverKind,
    /// Solver executable, looked up on `PATH` unless absolute
    pub command: String,
    /// Wall-clock limit per phase in seconds
    pub timeout: u64,
    /// How long a cached pointing remains a valid hint, seconds
    pub hint_timeout: f64,
    /// Search radius passed with a hint, degrees
    pub solve_radius: f64,
    /// Run the unhinted second phase on the extracted star list
    pub fallback: bool,
    pub sigma: f64,
    pub depth: String,
    pub uniformize: u32,
    /// Optional plate-scale bounds in arcsec/pixel
    pub scale_low: Option<f64>,
    pub scale_high: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            command: DEFAULT_SOLVER_COMMAND.to_string(),
            timeout: DEFAULT_SOLVER_TIMEOUT,
            hint_timeout: DEFAULT_HINT_TIMEOUT,
            solve_radius: DEFAULT_SOLVE_RADIUS,
            fallback: DEFAULT_SOLVER_FALLBACK,
            sigma: DEFAULT_SIGMA,
            depth: DEFAULT_DEPTH.to_string(),
            uniformize: DEFAULT_UNIFORMIZE,
            scale_low: None,
            scale_high: None,
        }
    }
}

impl SolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn hint_timeout(&self) -> Duration {
        seconds(self.hint_timeout)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub source: CameraSource,
    /// Still-capture executable for `source = "command"`
    pub command: String,
    /// Exposure in seconds
    pub shutter_speed: f64,
    pub iso_speed: u32,
    /// Frame size as `WIDTHxHEIGHT`
    pub image_size: String,
    /// Where captured frames are written
    pub output: PathBuf,
    /// Fixed frame for `source = "file"`
    pub image: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::default(),
            command: DEFAULT_CAMERA_COMMAND.to_string(),
            shutter_speed: DEFAULT_SHUTTER_SPEED,
            iso_speed: DEFAULT_ISO_SPEED,
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            output: PathBuf::from(DEFAULT_CAPTURE_OUTPUT),
            image: None,
        }
    }
}

impl CameraConfig {
    /// Parsed `image_size`.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        validation::parse_image_size(&self.image_size)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Lx200Config {
    pub host: String,
    pub port: u16,
}

impl Default for Lx200Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_LX200_HOST.to_string(),
            port: DEFAULT_LX200_PORT,
        }
    }
}

impl Lx200Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MountConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub sync_mode: SyncMode,
    /// Connect/read/write timeout per command, seconds
    pub timeout: f64,
    /// Upper bound on waiting for a slew to finish, seconds
    pub slew_timeout: f64,
    /// Delay between slew status polls, seconds
    pub poll_interval: f64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_MOUNT_HOST.to_string(),
            port: DEFAULT_MOUNT_PORT,
            sync_mode: SyncMode::default(),
            timeout: DEFAULT_MOUNT_TIMEOUT,
            slew_timeout: DEFAULT_SLEW_TIMEOUT,
            poll_interval: DEFAULT_SLEW_POLL_INTERVAL,
        }
    }
}

impl MountConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Print `log_debug!` output, applied live on every cycle
    pub debug: bool,
    /// Append log output to this file instead of stdout (read at startup)
    pub file: Option<PathBuf>,
}

/// Complete runtime configuration.
///
/// A `Config` is a plain value: the orchestrator takes an owned snapshot at
/// the top of each cycle and never shares it across threads.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    /// Seconds slept between cycles
    pub cycle_interval: f64,
    /// Seconds slept after a cycle that failed or panicked
    pub error_backoff: f64,
    pub status_file: PathBuf,
    pub solver: SolverConfig,
    pub camera: CameraConfig,
    pub lx200: Lx200Config,
    pub mount: MountConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            status_file: PathBuf::from(DEFAULT_STATUS_FILE),
            solver: SolverConfig::default(),
            camera: CameraConfig::default(),
            lx200: Lx200Config::default(),
            mount: MountConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the resolved config path, creating it if needed.
    pub fn load() -> Result<Self> {
        load()
    }

    pub fn get_config_path() -> Result<PathBuf> {
        get_config_path()
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        load_from_path(path)
    }

    pub fn cycle_sleep(&self) -> Duration {
        seconds(self.cycle_interval)
    }

    pub fn backoff_sleep(&self) -> Duration {
        seconds(self.error_backoff)
    }

    /// Log the settings relevant to the configured mode and backends.
    pub fn log_config(&self, source: Option<&Path>) {
        match source {
            Some(path) => log_block_start!("Loaded configuration from {}", private_path(path)),
            None => log_block_start!("Loaded default configuration"),
        }

        log_indented!("Mode: {}", self.mode);
        log_indented!(
            "Cycle interval: {}s (error backoff {}s)",
            self.cycle_interval,
            self.error_backoff
        );
        log_indented!("Status file: {}", private_path(&self.status_file));

        match self.solver.kind {
            SolverKind::Astrometry => {
                log_indented!(
                    "Solver: {} ({}s per phase, fallback {})",
                    self.solver.command,
                    self.solver.timeout,
                    if self.solver.fallback { "on" } else { "off" }
                );
                log_indented!(
                    "Hints: {}° radius, usable for {}s",
                    self.solver.solve_radius,
                    self.solver.hint_timeout
                );
            }
            SolverKind::Demo => log_indented!("Solver: demo"),
        }

        match self.camera.source {
            CameraSource::Command => log_indented!(
                "Camera: {} ({}s, ISO {}, {})",
                self.camera.command,
                self.camera.shutter_speed,
                self.camera.iso_speed,
                self.camera.image_size
            ),
            CameraSource::File => match &self.camera.image {
                Some(image) => log_indented!("Camera: fixed image {}", private_path(image)),
                None => log_indented!("Camera: fixed image (not set)"),
            },
        }

        log_indented!("LX200 server: {}", self.lx200.bind_address());

        if self.mount.enabled {
            log_indented!(
                "Mount: {} ({})",
                self.mount.address(),
                self.mount.sync_mode.as_str()
            );
        } else {
            log_indented!("Mount: disabled");
        }

        if self.logging.debug {
            log_indented!("Debug logging: enabled");
        }
    }
}

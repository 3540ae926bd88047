//! Configuration loading functionality.
//!
//! Resolves the config path, creates a default file when none exists, parses
//! and validates TOML, and keeps a reloadable snapshot in [`ConfigStore`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use super::Config;
use super::validation::validate_config;
use crate::common::constants::*;
use crate::common::utils::private_path;

/// Config file override from `--config`, set once at startup
static CONFIG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration file for the current process.
/// This can only be called once, typically at startup.
pub fn set_config_path(path: Option<PathBuf>) -> Result<()> {
    CONFIG_PATH
        .set(path)
        .map_err(|_| anyhow::anyhow!("Configuration path already set"))
}

/// Resolve the configuration file path.
///
/// An explicit `--config` path wins; otherwise the file lives under the XDG
/// config directory.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(Some(path)) = CONFIG_PATH.get() {
        return Ok(path.clone());
    }
    let config_dir =
        dirs::config_dir().context("Could not determine the user configuration directory")?;
    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load configuration from the resolved path, creating a default file first
/// when none exists.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        super::builder::create_default_config(&config_path)
            .context("Failed to create default config during load")?;
    }

    load_from_path(&config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            private_path(&config_path)
        )
    })
}

/// Load configuration from a specific path.
///
/// This version does NOT create a default config if the path doesn't exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", private_path(path)))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", private_path(path)))?;

    validate_config(&config)
        .with_context(|| format!("Invalid configuration in {}", private_path(path)))?;

    Ok(config)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Holds the current configuration snapshot and reloads it when the file's
/// modification time changes.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: Config,
    modified: Option<SystemTime>,
}

impl ConfigStore {
    /// Open the store at `path`, creating a default file if missing.
    ///
    /// The initial load must succeed; later reload failures are tolerated.
    pub fn open(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            super::builder::create_default_config(&path)
                .context("Failed to create default config")?;
        }
        let modified = modified_time(&path);
        let current = load_from_path(&path)?;
        Ok(Self {
            path,
            current,
            modified,
        })
    }

    /// Store for a config value that has no backing file.
    pub fn detached(config: Config) -> Self {
        Self {
            path: PathBuf::new(),
            current: config,
            modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file if its modification time differs from the last seen.
    ///
    /// Returns `true` when a new snapshot was installed. A file that cannot be
    /// read, parsed or validated leaves the previous snapshot in place.
    pub fn refresh(&mut self) -> bool {
        if self.path.as_os_str().is_empty() {
            return false;
        }

        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.modified {
            return false;
        }
        // Remember the timestamp even on failure so a broken file is reported once
        self.modified = modified;

        match load_from_path(&self.path) {
            Ok(config) => {
                let changed = config != self.current;
                self.current = config;
                if changed {
                    log_block_start!("Configuration reloaded");
                    log_indented!("Mode: {}", self.current.mode);
                }
                changed
            }
            Err(e) => {
                log_pipe!();
                log_warning!("Configuration reload failed, keeping previous settings");
                log_indented!("{:#}", e);
                false
            }
        }
    }

    /// Owned copy of the current configuration.
    pub fn snapshot(&self) -> Config {
        self.current.clone()
    }
}

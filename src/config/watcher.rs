//! File watching module for hot config reloading.
//!
//! The watcher only wakes the main loop. Whether anything is actually
//! reloaded is decided by the modification time check in
//! [`ConfigStore::refresh`](super::ConfigStore::refresh).

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::constants::CONFIG_WATCH_DEBOUNCE_MS;
use crate::common::utils::private_path;
use crate::io::signals::SignalMessage;

/// Configuration file watcher that sends reload messages on change.
pub struct ConfigWatcher {
    signal_sender: Sender<SignalMessage>,
    config_path: PathBuf,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, signal_sender: Sender<SignalMessage>) -> Self {
        Self {
            signal_sender,
            config_path,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The parent directory is watched rather than the file itself, so
    /// editors that save by writing a temp file and renaming are still seen.
    pub fn start(self) -> Result<()> {
        let Some(watch_dir) = self.config_path.parent().map(Path::to_path_buf) else {
            log_debug!("Config path has no parent directory, hot reload disabled");
            return Ok(());
        };

        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                            let _ = tx.send(event);
                        }
                        _ => {}
                    }
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", private_path(&watch_dir)))?;

        log_debug!(
            "Watching {} for configuration changes",
            private_path(&self.config_path)
        );

        let signal_sender = self.signal_sender;
        let config_path = self.config_path;

        thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                // Keep the watcher alive for the lifetime of the thread
                let _watcher = watcher;
                let mut last_reload: Option<Instant> = None;

                for event in rx {
                    if !event
                        .paths
                        .iter()
                        .any(|path| affects_config(path, &config_path))
                    {
                        continue;
                    }

                    if let Some(last) = last_reload
                        && last.elapsed() < Duration::from_millis(CONFIG_WATCH_DEBOUNCE_MS)
                    {
                        continue;
                    }

                    log_debug!("Configuration file change detected");

                    if signal_sender.send(SignalMessage::Reload).is_err() {
                        // Main loop is gone
                        break;
                    }
                    last_reload = Some(Instant::now());
                }
            })
            .context("Failed to spawn config watcher thread")?;

        Ok(())
    }
}

/// Whether a change event on `event_path` concerns the watched config file.
///
/// Editor temp files next to the config (`skysolve.toml~`,
/// `.skysolve.toml.swp`) count as well.
pub(crate) fn affects_config(event_path: &Path, config_path: &Path) -> bool {
    if event_path == config_path {
        return true;
    }
    if event_path.parent() != config_path.parent() {
        return false;
    }
    match (
        event_path.file_name().and_then(|n| n.to_str()),
        config_path.file_name().and_then(|n| n.to_str()),
    ) {
        (Some(event_name), Some(config_name)) => {
            event_name.trim_start_matches('.').starts_with(config_name)
        }
        _ => false,
    }
}

/// Start the configuration file watcher.
pub fn start_config_watcher(
    config_path: PathBuf,
    signal_sender: Sender<SignalMessage>,
) -> Result<()> {
    ConfigWatcher::new(config_path, signal_sender).start()
}

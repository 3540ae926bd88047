//! Mode command: persist a new operating mode.
//!
//! Only the `mode` line of the config file is rewritten. A running daemon
//! notices the new modification time and switches on its next cycle.

use anyhow::{Context, Result};
use std::path::Path;

use crate::common::utils::private_path;
use crate::config;
use crate::model::Mode;

/// Handle `skysolve mode <mode>`.
pub fn handle_mode_command(mode: Mode) -> Result<()> {
    log_version!();

    let config_path = config::get_config_path()?;
    let previous = set_mode(&config_path, mode)?;

    if previous == mode {
        log_block_start!("Mode unchanged");
        log_indented!("Already set to {mode}");
    } else {
        log_block_start!("Mode changed: {previous} -> {mode}");
        log_indented!("in {}", private_path(&config_path));
        log_indented!("A running daemon applies it on its next cycle");
    }

    log_end!();
    Ok(())
}

/// Write `mode` into the config at `path` and return the mode it replaced.
///
/// The file is created with defaults if missing. The edit is rejected when
/// the existing file does not load, so a broken config is never made worse.
pub fn set_mode(path: &Path, mode: Mode) -> Result<Mode> {
    if !path.exists() {
        config::create_default_config(path)?;
    }
    let previous = config::load_from_path(path)
        .context("Refusing to edit a configuration that does not load")?
        .mode;

    if previous != mode {
        config::update_mode(path, mode)?;
        let reloaded = config::load_from_path(path)?;
        if reloaded.mode != mode {
            anyhow::bail!(
                "Mode in {} did not update, check the file by hand",
                private_path(path)
            );
        }
    }
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_mode_creates_and_updates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skysolve.toml");

        assert_eq!(set_mode(&path, Mode::Align).unwrap(), Mode::Solve);
        assert_eq!(config::load_from_path(&path).unwrap().mode, Mode::Align);

        assert_eq!(set_mode(&path, Mode::Align).unwrap(), Mode::Align);
        assert_eq!(set_mode(&path, Mode::Test).unwrap(), Mode::Align);
        assert_eq!(config::load_from_path(&path).unwrap().mode, Mode::Test);
    }

    #[test]
    fn test_set_mode_keeps_other_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skysolve.toml");
        std::fs::write(&path, "cycle_interval = 5.0\n\n[lx200]\nport = 4030\n").unwrap();

        set_mode(&path, Mode::Test).unwrap();
        let config = config::load_from_path(&path).unwrap();
        assert_eq!(config.mode, Mode::Test);
        assert_eq!(config.cycle_interval, 5.0);
        assert_eq!(config.lx200.port, 4030);
    }

    #[test]
    fn test_set_mode_refuses_broken_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skysolve.toml");
        std::fs::write(&path, "mode = [broken\n").unwrap();

        assert!(set_mode(&path, Mode::Align).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "mode = [broken\n");
    }
}

//! Small helpers shared by the config, status and solver modules.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::MAX_CONFIG_SECONDS;

/// Render a path for logs with the home directory collapsed to `~`.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

/// Write `contents` to `path` through a sibling temp file and a rename.
///
/// Readers polling the file never observe a partially written document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory {}", private_path(&parent)))?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temp file in {}", private_path(&parent)))?;
    temp.write_all(contents)
        .context("Failed to write temp file contents")?;
    temp.flush().context("Failed to flush temp file")?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", private_path(path)))?;
    Ok(())
}

/// Same path with its extension replaced, e.g. `capture.jpg` -> `capture.solved`.
pub fn sibling_with_extension(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

/// Seconds from the config as a `Duration`, clamped to `[0, MAX_CONFIG_SECONDS]`.
///
/// NaN maps to zero.
pub fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0).min(MAX_CONFIG_SECONDS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("status.json");

        write_atomic(&target, b"first").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "first");

        write_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");

        // No stray temp files left behind
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_sibling_with_extension() {
        let image = Path::new("/tmp/skysolve/capture.jpg");
        assert_eq!(
            sibling_with_extension(image, "solved"),
            PathBuf::from("/tmp/skysolve/capture.solved")
        );
        assert_eq!(
            sibling_with_extension(Path::new("frame"), "xy"),
            PathBuf::from("frame.xy")
        );
    }

    #[test]
    fn test_seconds_clamps_out_of_range_values() {
        assert_eq!(seconds(2.5), Duration::from_millis(2500));
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1e20), Duration::from_secs(86_400));
        assert_eq!(seconds(f64::INFINITY), Duration::from_secs(86_400));
    }

    #[test]
    fn test_private_path_outside_home_is_unchanged() {
        assert_eq!(private_path(Path::new("/tmp/x.toml")), "/tmp/x.toml");
    }
}

//! Default config creation and in-place edits.
//!
//! The default file is generated with aligned inline comments so users can
//! read every option next to its value. Edits such as `skysolve mode align`
//! rewrite single lines and keep the rest of the file untouched.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::{private_path, write_atomic};
use crate::model::Mode;

/// Create a default config file at `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let config_content = default_config_content();

    write_atomic(path, config_content.as_bytes())
        .with_context(|| format!("Failed to write default config to {}", private_path(path)))?;

    log_block_start!("Created default configuration");
    log_indented!("{}", private_path(path));

    Ok(())
}

/// Text of the generated default configuration.
pub(crate) fn default_config_content() -> String {
    let mut content = ConfigBuilder::new()
        .add_section("Pipeline")
        .add_setting(
            "mode",
            &format!("\"{}\"", Mode::default()),
            "Select: \"solve\", \"align\" or \"test\"",
        )
        .add_setting(
            "cycle_interval",
            &format!("{DEFAULT_CYCLE_INTERVAL:.1}"),
            "Seconds between cycles",
        )
        .add_setting(
            "error_backoff",
            &format!("{DEFAULT_ERROR_BACKOFF:.1}"),
            "Seconds to wait after a failed cycle",
        )
        .add_setting(
            "status_file",
            &format!("\"{DEFAULT_STATUS_FILE}\""),
            "Status record read by external tools",
        )
        .add_table("solver")
        .add_setting(
            "type",
            "\"astrometry\"",
            "Solver backend: \"astrometry\" or \"demo\"",
        )
        .add_setting(
            "command",
            &format!("\"{DEFAULT_SOLVER_COMMAND}\""),
            "astrometry.net solve-field executable",
        )
        .add_setting(
            "timeout",
            &DEFAULT_SOLVER_TIMEOUT.to_string(),
            "Hard time limit per solve phase in seconds",
        )
        .add_setting(
            "hint_timeout",
            &format!("{DEFAULT_HINT_TIMEOUT:.1}"),
            "Seconds the last pointing stays usable as a search hint",
        )
        .add_setting(
            "solve_radius",
            &format!("{DEFAULT_SOLVE_RADIUS:.1}"),
            "Search radius around the hint in degrees (0-180]",
        )
        .add_setting(
            "fallback",
            &DEFAULT_SOLVER_FALLBACK.to_string(),
            "Retry unhinted on the extracted star list",
        )
        .add_setting(
            "sigma",
            &format!("{DEFAULT_SIGMA:.1}"),
            "Star detection threshold",
        )
        .add_setting(
            "depth",
            &format!("\"{DEFAULT_DEPTH}\""),
            "Number of stars examined per attempt",
        )
        .add_setting(
            "uniformize",
            &DEFAULT_UNIFORMIZE.to_string(),
            "Star list uniformization boxes (0 = off)",
        )
        .add_commented_setting("scale_low", "10.0", "Optional lower plate scale bound (arcsec/px)")
        .add_commented_setting("scale_high", "120.0", "Optional upper plate scale bound (arcsec/px)")
        .add_table("camera")
        .add_setting(
            "source",
            "\"command\"",
            "Frame source: \"command\" or \"file\"",
        )
        .add_setting(
            "command",
            &format!("\"{DEFAULT_CAMERA_COMMAND}\""),
            "Still-capture executable",
        )
        .add_setting(
            "shutter_speed",
            &format!("{DEFAULT_SHUTTER_SPEED:.1}"),
            "Exposure in seconds",
        )
        .add_setting("iso_speed", &DEFAULT_ISO_SPEED.to_string(), "Sensor gain as ISO")
        .add_setting(
            "image_size",
            &format!("\"{DEFAULT_IMAGE_SIZE}\""),
            "Frame size WIDTHxHEIGHT",
        )
        .add_setting(
            "output",
            &format!("\"{DEFAULT_CAPTURE_OUTPUT}\""),
            "Where captured frames are written",
        )
        .add_commented_setting(
            "image",
            "\"/path/to/frame.jpg\"",
            "Fixed frame used when source = \"file\"",
        )
        .add_table("lx200")
        .add_setting(
            "host",
            &format!("\"{DEFAULT_LX200_HOST}\""),
            "Listen address (read at startup)",
        )
        .add_setting(
            "port",
            &DEFAULT_LX200_PORT.to_string(),
            "Listen port (read at startup)",
        )
        .add_table("mount")
        .add_setting("enabled", "false", "Push solves to an OnStep mount")
        .add_setting(
            "host",
            &format!("\"{DEFAULT_MOUNT_HOST}\""),
            "Mount address",
        )
        .add_setting("port", &DEFAULT_MOUNT_PORT.to_string(), "Mount LX200 port")
        .add_setting(
            "sync_mode",
            "\"sync\"",
            "Select: \"sync\" or \"slew_then_sync\"",
        )
        .add_setting(
            "timeout",
            &format!("{DEFAULT_MOUNT_TIMEOUT:.1}"),
            "Connect/read/write timeout in seconds",
        )
        .add_setting(
            "slew_timeout",
            &format!("{DEFAULT_SLEW_TIMEOUT:.1}"),
            "Seconds to wait for a slew to finish",
        )
        .add_setting(
            "poll_interval",
            &format!("{DEFAULT_SLEW_POLL_INTERVAL:.1}"),
            "Seconds between slew status polls",
        )
        .add_table("logging")
        .add_setting("debug", "false", "Verbose output, applied live")
        .add_commented_setting(
            "file",
            "\"/tmp/skysolve/skysolve.log\"",
            "Append log output to a file (read at startup)",
        )
        .build();
    content.push('\n');
    content
}

/// Rewrite the top-level `mode` key, preserving every other line.
pub fn update_mode(path: &Path, mode: Mode) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", private_path(path)))?;

    let new_value = format!("\"{mode}\"");
    let updated_content = match find_top_level_line(&content, "mode") {
        Some(mode_line) => {
            let new_line = preserve_comment_formatting(&mode_line, "mode", &new_value);
            content.replacen(&mode_line, &new_line, 1)
        }
        // Must precede the first table or it would land inside it
        None => format!("mode = {new_value}\n{content}"),
    };

    if updated_content != content {
        write_atomic(path, updated_content.as_bytes()).with_context(|| {
            format!("Failed to write updated config to {}", private_path(path))
        })?;
    }

    Ok(())
}

/// Builder for the generated config file with aligned comments.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Table(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Comment heading for top-level keys.
    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    /// TOML table header.
    fn add_table(mut self, name: &str) -> Self {
        self.entries.push(ConfigEntry::Table(format!("[{name}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    /// Optional setting shipped disabled.
    fn add_commented_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("# {key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_heading = true;

        for entry in self.entries {
            match entry {
                ConfigEntry::Section(heading) | ConfigEntry::Table(heading) => {
                    if !first_heading {
                        result.push(String::new());
                    }
                    result.push(heading);
                    first_heading = false;
                }
                ConfigEntry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }

        result.join("\n")
    }
}

/// Find an uncommented `key = value` line before the first table header.
pub(crate) fn find_top_level_line(content: &str, key: &str) -> Option<String> {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            return None;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(key)
            && rest.trim_start().starts_with('=')
        {
            return Some(line.to_string());
        }
    }
    None
}

/// Replace the value of a config line, keeping its trailing comment and the
/// spacing in front of it.
pub(crate) fn preserve_comment_formatting(
    original_line: &str,
    key: &str,
    new_value: &str,
) -> String {
    let key_value_part = format!("{key} = {new_value}");

    if let Some(comment_pos) = original_line.find('#') {
        let comment_part = &original_line[comment_pos..];

        let before_comment = &original_line[..comment_pos];
        let original_spacing =
            if let Some(last_non_space) = before_comment.rfind(|c: char| !c.is_whitespace()) {
                &before_comment[last_non_space + 1..]
            } else {
                " "
            };

        format!("{key_value_part}{original_spacing}{comment_part}")
    } else {
        key_value_part
    }
}

//! Configuration validation functionality.
//!
//! Rejects values that would make the loop spin, the solver never finish, or
//! the mount client unreachable.

use anyhow::{Context, Result};

use super::Config;
use crate::common::constants::MAX_CONFIG_SECONDS;

/// Validate a parsed configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    for (name, value) in [
        ("cycle_interval", config.cycle_interval),
        ("error_backoff", config.error_backoff),
    ] {
        check_seconds(name, value)?;
    }

    // Solver
    let solver = &config.solver;
    if solver.timeout == 0 || solver.timeout as f64 > MAX_CONFIG_SECONDS {
        anyhow::bail!(
            "solver.timeout must be between 1 and {MAX_CONFIG_SECONDS} seconds (got {})",
            solver.timeout
        );
    }

    if !(solver.solve_radius > 0.0 && solver.solve_radius <= 180.0) {
        anyhow::bail!(
            "solver.solve_radius must be within (0, 180] degrees (got {})",
            solver.solve_radius
        );
    }

    if !(solver.hint_timeout.is_finite()
        && (0.0..=MAX_CONFIG_SECONDS).contains(&solver.hint_timeout))
    {
        anyhow::bail!(
            "solver.hint_timeout must be within [0, {MAX_CONFIG_SECONDS}] seconds (got {})",
            solver.hint_timeout
        );
    }

    if solver.command.trim().is_empty() {
        anyhow::bail!("solver.command cannot be empty");
    }

    if let (Some(low), Some(high)) = (solver.scale_low, solver.scale_high)
        && low >= high
    {
        anyhow::bail!("solver.scale_low ({low}) must be below solver.scale_high ({high})");
    }

    // Camera
    parse_image_size(&config.camera.image_size).context("Invalid camera.image_size")?;

    if !(config.camera.shutter_speed.is_finite() && config.camera.shutter_speed > 0.0) {
        anyhow::bail!(
            "camera.shutter_speed must be positive (got {})",
            config.camera.shutter_speed
        );
    }

    // Mount
    let mount = &config.mount;
    if mount.port == 0 {
        anyhow::bail!("mount.port cannot be 0");
    }

    for (name, value) in [
        ("mount.timeout", mount.timeout),
        ("mount.slew_timeout", mount.slew_timeout),
        ("mount.poll_interval", mount.poll_interval),
    ] {
        check_seconds(name, value)?;
    }

    Ok(())
}

/// Intervals and timeouts must be positive and at most a day.
fn check_seconds(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0 && value <= MAX_CONFIG_SECONDS) {
        anyhow::bail!("{name} must be within (0, {MAX_CONFIG_SECONDS}] seconds (got {value})");
    }
    Ok(())
}

/// Parse a `WIDTHxHEIGHT` frame size.
pub fn parse_image_size(size: &str) -> Result<(u32, u32)> {
    let (width, height) = size
        .trim()
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got '{size}'"))?;

    let width: u32 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in '{size}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in '{size}'"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("image dimensions must be non-zero (got '{size}')");
    }

    Ok((width, height))
}

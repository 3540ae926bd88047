//! Solve command: run the configured solver once against an image.
//!
//! The solver transcript is streamed to the terminal as it is produced, or
//! collected into the JSON document with `--json`.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::config;
use crate::logger::Log;
use crate::model::SolveResult;
use crate::solver::{Hint, SolveLog, SolverBackend};

/// Prints transcript lines as they arrive.
struct TerminalLog;

impl SolveLog for TerminalLog {
    fn log_line(&mut self, line: &str) {
        log_indented!("{line}");
    }
}

/// Handle `skysolve solve <image>`.
pub fn handle_solve_command(image: &str, hint: Option<Hint>, json: bool) -> Result<()> {
    let config = config::load()?;
    let backend = SolverBackend::from_config(&config.solver);
    let image = Path::new(image);

    let result = if json {
        // Keep stdout clean for the JSON document
        let was_enabled = Log::is_enabled();
        Log::set_enabled(false);
        let mut transcript: Vec<String> = Vec::new();
        let outcome = backend.solve(image, hint, &mut transcript);
        Log::set_enabled(was_enabled);

        let result = outcome.context("Cannot solve this input")?;
        println!("{}", render_json(&result, &transcript)?);
        result
    } else {
        log_version!();
        log_block_start!("Solving {} with {}", image.display(), backend.name());
        if let Some(hint) = &hint {
            log_indented!("Hint: RA {} Dec {}", hint.ra_deg, hint.dec_deg);
        }

        let result = backend
            .solve(image, hint, &mut TerminalLog)
            .context("Cannot solve this input")?;

        if result.solved {
            log_block_start!("Solved: {result}");
            if let Some(scale) = result.plate_scale_arcsec_px {
                log_indented!("Plate scale: {scale:.3} arcsec/px");
            }
            if let Some(roll) = result.roll_deg {
                log_indented!("Field rotation: {roll:.2}°");
            }
        } else {
            log_error_exit!("No solution found");
        }
        log_end!();
        result
    };

    if !result.solved {
        anyhow::bail!("No solution found");
    }
    Ok(())
}

/// The result plus the solver transcript as one JSON document.
pub(crate) fn render_json(result: &SolveResult, transcript: &[String]) -> Result<String> {
    let document = json!({
        "result": result,
        "log": transcript,
    });
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Equatorial;

    #[test]
    fn test_render_json() {
        let result = SolveResult::solved(Equatorial::new(180.0, 45.0), Some(0.0), Some(12.3), None);
        let text = render_json(&result, &["Phase 1".to_string()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["result"]["coords"]["ra_deg"], 180.0);
        assert_eq!(value["result"]["solved"], true);
        assert!(value["result"]["confidence"].is_null());
        assert_eq!(value["log"][0], "Phase 1");
    }
}

//! Status command: print the artifact the daemon writes every cycle.

use anyhow::Result;

use crate::config;
use crate::lx200::{format_dec, format_ra};
use crate::status::{self, StatusRecord};

/// Handle `skysolve status [--json]`.
pub fn handle_status_command(json: bool) -> Result<()> {
    let config = config::load()?;
    let record = status::read(&config.status_file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        for line in describe(&record) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Human-readable rendering of a status record.
pub(crate) fn describe(record: &StatusRecord) -> Vec<String> {
    let mode = record
        .mode
        .map_or_else(|| "unknown".to_string(), |m| m.to_string());

    let fix = match (record.ra, record.dec) {
        (Some(ra), Some(dec)) => format!(
            "RA {} ({ra:.4}°)  Dec {} ({dec:+.4}°)",
            format_ra(ra),
            format_dec(dec)
        ),
        _ => "none yet".to_string(),
    };
    let confidence = record
        .confidence
        .map_or_else(|| "-".to_string(), |c| format!("{c:.2}"));
    let solved_at = record.timestamp.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    );

    let mut lines = vec![
        format!("      Mode: {mode}"),
        format!("  Last fix: {fix}"),
        format!("Confidence: {confidence}"),
        format!(" Solved at: {solved_at}"),
    ];
    if let Some(error) = &record.error {
        lines.push(format!("     Error: {error}"));
    }
    lines
}
